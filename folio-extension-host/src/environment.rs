//! Document environment seam.
//!
//! The mediator never talks to the document runtime directly. Everything it
//! produces — registration notices, live data bindings, handler invocations —
//! flows through a [`DocumentEnvironment`] supplied by the host.

use crate::livedata::LiveDataHandle;
use serde_json::Value;

/// A single event-handler invocation requested by the mediator.
///
/// `event` carries the handler-scoped payload: for extension events the raw
/// event payload, for live data changes `{ "current": ..., "changed": [...] }`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventHandlerInvocation {
    /// URI of the extension the invocation originates from.
    pub uri: String,
    /// Handler expression declared in the document or schema.
    pub handler: String,
    /// Handler-scoped payload.
    pub event: Value,
    /// Optional sequencer name the invocation should run on.
    pub sequencer: Option<String>,
}

/// Host-side surface the mediator drives.
///
/// Implementations must tolerate being called from whatever thread the
/// configured executor runs tasks on.
pub trait DocumentEnvironment: Send + Sync {
    /// An extension finished registering. `display_name` is the name the
    /// document requested the extension under.
    fn extension_registered(&self, uri: &str, display_name: &str);

    /// A live data object was created from a registration schema and should
    /// be bound into the document's data scope under `name`.
    fn bind_live_data(&self, name: &str, handle: LiveDataHandle);

    /// A live data object's contents changed; the document should re-read
    /// bindings derived from it.
    fn live_data_changed(&self, name: &str);

    /// Run a declared event handler.
    fn invoke_event_handler(&self, invocation: EventHandlerInvocation);
}
