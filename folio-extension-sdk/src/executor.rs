//! Task-queue capability controlling when deferred mediator work runs.
//!
//! All callback-originated work that touches mediator or document state is
//! funneled through a single [`Executor`], giving the host one serialization
//! point: run inline on the caller's stack, or defer to the document's own
//! processing tick. Tasks enqueued for the same executor run in enqueue
//! order.

use tokio::sync::mpsc;
use tracing::debug;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Controls when queued work actually runs.
pub trait Executor: Send + Sync {
    /// Queues `task`. Returns `false` when the task was not accepted, in
    /// which case it will never run.
    fn enqueue_task(&self, task: Task) -> bool;
}

/// Executes every task synchronously before `enqueue_task` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn enqueue_task(&self, task: Task) -> bool {
        task();
        true
    }
}

/// Defers tasks through an unbounded channel drained by a spawned tokio
/// task, preserving FIFO order.
pub struct ChannelExecutor {
    sender: mpsc::UnboundedSender<Task>,
}

impl ChannelExecutor {
    /// Spawns the drain loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                task();
            }
            debug!("channel executor drained and closed");
        });
        Self { sender }
    }
}

impl Executor for ChannelExecutor {
    fn enqueue_task(&self, task: Task) -> bool {
        self.sender.send(task).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn inline_executor_runs_before_returning() {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&count);
        assert!(InlineExecutor.enqueue_task(Box::new(move || {
            captured.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn channel_executor_preserves_enqueue_order() {
        let executor = ChannelExecutor::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        for index in 0..10 {
            let captured = Arc::clone(&seen);
            assert!(executor.enqueue_task(Box::new(move || {
                captured.lock().unwrap().push(index);
            })));
        }
        let captured = Arc::clone(&seen);
        assert!(executor.enqueue_task(Box::new(move || {
            assert_eq!(*captured.lock().unwrap(), (0..10).collect::<Vec<_>>());
            let _ = done_tx.send(());
        })));

        done_rx.await.expect("drain task completed");
    }
}
