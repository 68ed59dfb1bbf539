//! Extension protocol messages.
//!
//! The protocol is a request/response pair per lifecycle step plus two push
//! directions from the extension side:
//! 1. The host sends a registration request carrying flags and settings
//! 2. The extension answers with a schema (success) or an error (failure)
//! 3. Host-issued commands flow host -> extension
//! 4. Events and live-data updates flow extension -> host
//!
//! Messages are plain serde structs so local proxies can pass them typed
//! while message-passing proxies serialize them as JSON.

use crate::schema::ExtensionSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every message.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Registration request sent to an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Protocol version.
    pub version: String,
    /// Host-registered runtime flags for the target URI.
    #[serde(default)]
    pub flags: Value,
    /// Document-declared settings block for the target URI.
    #[serde(default)]
    pub settings: Value,
}

impl RegistrationRequest {
    /// Creates an empty registration request.
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            flags: Value::Null,
            settings: Value::Null,
        }
    }

    /// Sets the runtime flags.
    pub fn with_flags(mut self, flags: Value) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the settings block.
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for RegistrationRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful registration response carrying the extension schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSuccess {
    /// Protocol version.
    pub version: String,
    /// URI the registration applies to.
    pub uri: String,
    /// Session token echoed back through `on_registered`.
    pub token: String,
    /// Declared commands, events, and live-data bindings.
    pub schema: ExtensionSchema,
}

impl RegistrationSuccess {
    /// Creates a success response.
    pub fn new(uri: impl Into<String>, token: impl Into<String>, schema: ExtensionSchema) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            uri: uri.into(),
            token: token.into(),
            schema,
        }
    }
}

/// Failed registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFailure {
    /// Protocol version.
    pub version: String,
    /// Numeric error code.
    pub error_code: i64,
    /// Human-readable error message.
    pub error_message: String,
}

impl RegistrationFailure {
    /// Creates a failure response.
    pub fn new(error_code: i64, error_message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            error_code,
            error_message: error_message.into(),
        }
    }

    /// Generic exception failure.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(100, message)
    }
}

/// Command invocation sent to an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Protocol version.
    pub version: String,
    /// Always `"Command"`.
    pub method: String,
    /// Per-session monotonically increasing command id.
    pub id: u64,
    /// Target extension URI.
    pub target: String,
    /// Declared command name.
    pub name: String,
    /// Assembled command properties (declared defaults filled in).
    #[serde(default)]
    pub payload: Value,
}

impl CommandRequest {
    /// Creates a command request.
    pub fn new(id: u64, target: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            method: "Command".to_string(),
            id,
            target: target.into(),
            name: name.into(),
            payload,
        }
    }
}

/// Failure outcome for a command that required resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    /// Id of the failed command.
    pub id: u64,
    /// Numeric error code.
    pub error_code: i64,
    /// Human-readable error message.
    pub error_message: String,
}

impl CommandError {
    /// Creates a command failure.
    pub fn new(id: u64, error_code: i64, error_message: impl Into<String>) -> Self {
        Self {
            id,
            error_code,
            error_message: error_message.into(),
        }
    }
}

/// Event pushed by an extension to the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Protocol version.
    pub version: String,
    /// Always `"Event"`.
    pub method: String,
    /// Source extension URI.
    pub target: String,
    /// Declared event name.
    pub name: String,
    /// Event payload exposed under the `event` namespace.
    #[serde(default)]
    pub payload: Value,
    /// Optional named execution sequence for the handler commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequencer: Option<String>,
}

impl EventMessage {
    /// Creates an event message.
    pub fn new(target: impl Into<String>, name: impl Into<String>, payload: Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            method: "Event".to_string(),
            target: target.into(),
            name: name.into(),
            payload,
            sequencer: None,
        }
    }

    /// Routes the handler commands onto a named execution sequence.
    pub fn on_sequencer(mut self, sequencer: impl Into<String>) -> Self {
        self.sequencer = Some(sequencer.into());
        self
    }
}

/// Ordered batch of live-data operations pushed by an extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveDataUpdateMessage {
    /// Protocol version.
    pub version: String,
    /// Always `"LiveDataUpdate"`.
    pub method: String,
    /// Name of the bound live-data object.
    pub name: String,
    /// Source extension URI.
    pub target: String,
    /// Operations, applied in listed order.
    ///
    /// Kept as raw values so an unrecognized operation kind is a validation
    /// failure at reconcile time rather than a transport failure.
    pub operations: Vec<Value>,
}

impl LiveDataUpdateMessage {
    /// Creates a live-data update batch.
    pub fn new(target: impl Into<String>, name: impl Into<String>, operations: Vec<Value>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            method: "LiveDataUpdate".to_string(),
            name: name.into(),
            target: target.into(),
            operations,
        }
    }
}

/// A single live-data operation.
///
/// Array objects accept `Insert`/`Update`/`Remove`/`Clear`; map objects
/// accept `Set`/`Remove`/`Clear`. An `Insert` whose `item` is a JSON array
/// inserts the elements as a contiguous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveDataOperation {
    /// Insert one value (or a run of values) at `index`, shifting later elements.
    Insert { index: usize, item: Value },
    /// Replace the element at `index`.
    Update { index: usize, item: Value },
    /// Remove the element at `index` (array) or the entry at `key` (map).
    Remove {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// Empty the container.
    Clear,
    /// Insert or overwrite `key` in the map.
    Set { key: String, item: Value },
}

impl LiveDataOperation {
    /// Parses a raw wire operation, rejecting unrecognized kinds.
    pub fn from_wire(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    /// Convenience constructor for an array insert.
    pub fn insert(index: usize, item: Value) -> Value {
        serde_json::json!({ "type": "Insert", "index": index, "item": item })
    }

    /// Convenience constructor for an array update.
    pub fn update(index: usize, item: Value) -> Value {
        serde_json::json!({ "type": "Update", "index": index, "item": item })
    }

    /// Convenience constructor for an array remove.
    pub fn remove(index: usize) -> Value {
        serde_json::json!({ "type": "Remove", "index": index })
    }

    /// Convenience constructor for a clear.
    pub fn clear() -> Value {
        serde_json::json!({ "type": "Clear" })
    }

    /// Convenience constructor for a map set.
    pub fn set(key: impl Into<String>, item: Value) -> Value {
        serde_json::json!({ "type": "Set", "key": key.into(), "item": item })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn event_message_round_trips() {
        let msg = EventMessage::new("folioext:hello:10", "onThing", json!({"potatoes": "exactly"}));
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(wire["method"], "Event");
        assert_eq!(wire["version"], PROTOCOL_VERSION);
        assert!(wire.get("sequencer").is_none());

        let parsed: EventMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed.name, "onThing");
        assert_eq!(parsed.payload["potatoes"], "exactly");
    }

    #[test]
    fn event_message_parses_without_payload() {
        let parsed: EventMessage = serde_json::from_value(json!({
            "version": "1.0",
            "method": "Event",
            "target": "folioext:hello:10",
            "name": "bare"
        }))
        .unwrap();
        assert_eq!(parsed.payload, Value::Null);
    }

    #[test]
    fn live_data_operation_parses_known_kinds() {
        let op = LiveDataOperation::from_wire(&json!({"type": "Insert", "index": 0, "item": 2}))
            .unwrap();
        assert_eq!(
            op,
            LiveDataOperation::Insert {
                index: 0,
                item: json!(2)
            }
        );

        let op = LiveDataOperation::from_wire(&json!({"type": "Set", "key": "alive", "item": false}))
            .unwrap();
        assert_eq!(
            op,
            LiveDataOperation::Set {
                key: "alive".to_string(),
                item: json!(false)
            }
        );

        let op = LiveDataOperation::from_wire(&json!({"type": "Clear"})).unwrap();
        assert_eq!(op, LiveDataOperation::Clear);
    }

    #[test]
    fn live_data_operation_rejects_unknown_kind() {
        assert!(LiveDataOperation::from_wire(&json!({"type": "Bad"})).is_err());
    }

    #[test]
    fn registration_failure_uses_camel_case_wire_names() {
        let wire = serde_json::to_value(RegistrationFailure::exception("boom")).unwrap();
        assert_eq!(wire["errorCode"], 100);
        assert_eq!(wire["errorMessage"], "boom");
    }
}
