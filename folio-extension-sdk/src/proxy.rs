//! The proxy capability consumed by the host-side mediator.
//!
//! A proxy is the local handle for one or more extension URIs, regardless of
//! where the extension actually executes. Request/response operations take
//! one-shot callback pairs; push directions are registered once and may fire
//! any number of times, from any thread.

use crate::protocol::{
    CommandError, CommandRequest, EventMessage, LiveDataUpdateMessage, RegistrationFailure,
    RegistrationRequest, RegistrationSuccess,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One-shot success callback for a registration request: `(uri, response)`.
pub type RegistrationSuccessCallback = Box<dyn FnOnce(&str, RegistrationSuccess) + Send>;

/// One-shot failure callback for a registration request: `(uri, failure)`.
pub type RegistrationFailureCallback = Box<dyn FnOnce(&str, RegistrationFailure) + Send>;

/// One-shot success callback for a command invocation: `(uri, result)`.
pub type CommandSuccessCallback = Box<dyn FnOnce(&str, Option<Value>) + Send>;

/// One-shot failure callback for a command invocation: `(uri, error)`.
pub type CommandFailureCallback = Box<dyn FnOnce(&str, CommandError) + Send>;

/// Push callback for extension-generated events: `(uri, message)`.
pub type EventCallback = Arc<dyn Fn(&str, EventMessage) + Send + Sync>;

/// Push callback for extension-generated live-data updates: `(uri, message)`.
pub type LiveDataCallback = Arc<dyn Fn(&str, LiveDataUpdateMessage) + Send + Sync>;

/// Capability interface over one or more extension URIs.
///
/// Request operations return `false` when the proxy does not accept the
/// request at all; an accepted request resolves later through the supplied
/// callbacks, possibly synchronously on the calling stack.
pub trait ExtensionProxy: Send + Sync {
    /// URIs this proxy can service.
    fn uris(&self) -> BTreeSet<String>;

    /// Initializes the extension behind `uri`. Returns `false` on failure.
    fn initialize_extension(&self, uri: &str) -> bool;

    /// Requests registration. Returns whether the request was accepted.
    fn get_registration(
        &self,
        uri: &str,
        request: RegistrationRequest,
        on_success: RegistrationSuccessCallback,
        on_failure: RegistrationFailureCallback,
    ) -> bool;

    /// Dispatches a validated command. Returns whether dispatch was accepted.
    fn invoke_command(
        &self,
        uri: &str,
        command: CommandRequest,
        on_success: CommandSuccessCallback,
        on_failure: CommandFailureCallback,
    ) -> bool;

    /// Sends an opaque message to the extension. Returns `false` if refused.
    fn send_message(&self, uri: &str, message: Value) -> bool;

    /// Registers the push callback for extension-generated events.
    fn register_event_callback(&self, callback: EventCallback);

    /// Registers the push callback for extension-generated live-data updates.
    fn register_live_data_callback(&self, callback: LiveDataCallback);

    /// Notifies the proxy that `uri` completed registration with `token`.
    fn on_registered(&self, uri: &str, token: &str);
}
