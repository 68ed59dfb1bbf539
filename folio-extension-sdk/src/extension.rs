//! In-process extensions and the local proxy adapter.

use crate::protocol::{
    CommandRequest, EventMessage, LiveDataUpdateMessage, RegistrationFailure, RegistrationRequest,
    RegistrationSuccess,
};
use crate::proxy::{
    CommandFailureCallback, CommandSuccessCallback, EventCallback, ExtensionProxy,
    LiveDataCallback, RegistrationFailureCallback, RegistrationSuccessCallback,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// An extension that runs inside the host process.
///
/// Most extensions only implement `create_registration` and
/// `invoke_command` — the remaining methods have workable defaults.
pub trait Extension: Send + Sync {
    /// URIs this extension services.
    fn uris(&self) -> BTreeSet<String>;

    /// Prepares the extension for use. Returns `false` to fail initialization.
    fn initialize(&self, uri: &str) -> bool {
        let _ = uri;
        true
    }

    /// Produces the registration response for `uri`.
    fn create_registration(
        &self,
        uri: &str,
        request: &RegistrationRequest,
    ) -> Result<RegistrationSuccess, RegistrationFailure>;

    /// Executes a validated command. Returns `false` to reject it.
    fn invoke_command(&self, uri: &str, command: &CommandRequest) -> bool;

    /// Handles an opaque host message. Returns `false` if unhandled.
    fn on_message(&self, uri: &str, message: &Value) -> bool {
        let _ = (uri, message);
        false
    }

    /// Called once registration completes, with the session token.
    fn on_registered(&self, uri: &str, token: &str) {
        let _ = (uri, token);
    }
}

/// Proxy adapter for an in-process [`Extension`].
///
/// Request callbacks resolve synchronously on the calling stack; the push
/// directions are exposed as [`emit_event`](Self::emit_event) and
/// [`emit_live_data_update`](Self::emit_live_data_update) so the wrapped
/// extension (or a test) can generate traffic toward the host.
pub struct LocalExtensionProxy {
    extension: Arc<dyn Extension>,
    event_callbacks: Mutex<Vec<EventCallback>>,
    live_data_callbacks: Mutex<Vec<LiveDataCallback>>,
}

impl LocalExtensionProxy {
    /// Wraps an in-process extension.
    pub fn new(extension: Arc<dyn Extension>) -> Self {
        Self {
            extension,
            event_callbacks: Mutex::new(Vec::new()),
            live_data_callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Pushes an extension-generated event to every registered callback.
    /// Returns `false` when no callback is registered yet.
    pub fn emit_event(&self, uri: &str, message: EventMessage) -> bool {
        let callbacks = self.event_callbacks.lock().expect("event callback lock");
        if callbacks.is_empty() {
            debug!(uri, event = %message.name, "event dropped: no callback registered");
            return false;
        }
        for callback in callbacks.iter() {
            callback(uri, message.clone());
        }
        true
    }

    /// Pushes an extension-generated live-data update to every registered
    /// callback. Returns `false` when no callback is registered yet.
    pub fn emit_live_data_update(&self, uri: &str, message: LiveDataUpdateMessage) -> bool {
        let callbacks = self
            .live_data_callbacks
            .lock()
            .expect("live data callback lock");
        if callbacks.is_empty() {
            debug!(uri, object = %message.name, "live-data update dropped: no callback registered");
            return false;
        }
        for callback in callbacks.iter() {
            callback(uri, message.clone());
        }
        true
    }
}

impl ExtensionProxy for LocalExtensionProxy {
    fn uris(&self) -> BTreeSet<String> {
        self.extension.uris()
    }

    fn initialize_extension(&self, uri: &str) -> bool {
        self.extension.initialize(uri)
    }

    fn get_registration(
        &self,
        uri: &str,
        request: RegistrationRequest,
        on_success: RegistrationSuccessCallback,
        on_failure: RegistrationFailureCallback,
    ) -> bool {
        match self.extension.create_registration(uri, &request) {
            Ok(success) => on_success(uri, success),
            Err(failure) => on_failure(uri, failure),
        }
        true
    }

    fn invoke_command(
        &self,
        uri: &str,
        command: CommandRequest,
        on_success: CommandSuccessCallback,
        on_failure: CommandFailureCallback,
    ) -> bool {
        let id = command.id;
        if self.extension.invoke_command(uri, &command) {
            on_success(uri, None);
        } else {
            on_failure(
                uri,
                crate::protocol::CommandError::new(id, 100, "command rejected by extension"),
            );
        }
        true
    }

    fn send_message(&self, uri: &str, message: Value) -> bool {
        self.extension.on_message(uri, &message)
    }

    fn register_event_callback(&self, callback: EventCallback) {
        self.event_callbacks
            .lock()
            .expect("event callback lock")
            .push(callback);
    }

    fn register_live_data_callback(&self, callback: LiveDataCallback) {
        self.live_data_callbacks
            .lock()
            .expect("live data callback lock")
            .push(callback);
    }

    fn on_registered(&self, uri: &str, token: &str) {
        self.extension.on_registered(uri, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ExtensionSchema;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct EchoExtension {
        uri: String,
        accept_commands: bool,
        registered: AtomicBool,
    }

    impl EchoExtension {
        fn new(uri: &str, accept_commands: bool) -> Self {
            Self {
                uri: uri.to_string(),
                accept_commands,
                registered: AtomicBool::new(false),
            }
        }
    }

    impl Extension for EchoExtension {
        fn uris(&self) -> BTreeSet<String> {
            BTreeSet::from([self.uri.clone()])
        }

        fn create_registration(
            &self,
            uri: &str,
            _request: &RegistrationRequest,
        ) -> Result<RegistrationSuccess, RegistrationFailure> {
            Ok(RegistrationSuccess::new(
                uri,
                "token",
                ExtensionSchema::new(uri),
            ))
        }

        fn invoke_command(&self, _uri: &str, _command: &CommandRequest) -> bool {
            self.accept_commands
        }

        fn on_registered(&self, _uri: &str, _token: &str) {
            self.registered.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn registration_resolves_synchronously() {
        let proxy = LocalExtensionProxy::new(Arc::new(EchoExtension::new("ext:echo:1", true)));
        let outcome = Arc::new(Mutex::new(None));

        let captured = Arc::clone(&outcome);
        let accepted = proxy.get_registration(
            "ext:echo:1",
            RegistrationRequest::new(),
            Box::new(move |_, success| {
                *captured.lock().unwrap() = Some(success.token);
            }),
            Box::new(|_, _| panic!("unexpected failure")),
        );

        assert!(accepted);
        assert_eq!(outcome.lock().unwrap().as_deref(), Some("token"));
    }

    #[test]
    fn rejected_command_reports_failure() {
        let proxy = LocalExtensionProxy::new(Arc::new(EchoExtension::new("ext:echo:1", false)));
        let failed = Arc::new(AtomicBool::new(false));

        let captured = Arc::clone(&failed);
        proxy.invoke_command(
            "ext:echo:1",
            CommandRequest::new(7, "ext:echo:1", "noop", json!({})),
            Box::new(|_, _| panic!("unexpected success")),
            Box::new(move |_, error| {
                assert_eq!(error.id, 7);
                captured.store(true, Ordering::SeqCst);
            }),
        );

        assert!(failed.load(Ordering::SeqCst));
    }

    #[test]
    fn emit_without_callback_is_dropped() {
        let proxy = LocalExtensionProxy::new(Arc::new(EchoExtension::new("ext:echo:1", true)));
        assert!(!proxy.emit_event(
            "ext:echo:1",
            EventMessage::new("ext:echo:1", "onThing", json!({}))
        ));

        let seen = Arc::new(AtomicBool::new(false));
        let captured = Arc::clone(&seen);
        proxy.register_event_callback(Arc::new(move |_, _| {
            captured.store(true, Ordering::SeqCst);
        }));

        assert!(proxy.emit_event(
            "ext:echo:1",
            EventMessage::new("ext:echo:1", "onThing", json!({}))
        ));
        assert!(seen.load(Ordering::SeqCst));
    }
}
