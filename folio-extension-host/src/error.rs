//! Error types for the extension host.
//!
//! Every variant is locally recoverable: a validation failure drops the
//! offending action or batch without touching state, a lifecycle failure
//! degrades one URI, and an executor rejection loses one task. Nothing here
//! is fatal to the session.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtensionHostError {
    #[error("extension not available: {0}")]
    ExtensionNotAvailable(String),

    #[error("unknown command '{name}' for extension '{uri}'")]
    UnknownCommand { uri: String, name: String },

    #[error("command '{command}' missing required property '{property}' with no default")]
    MissingRequiredProperty { command: String, property: String },

    #[error("command '{name}' dispatch rejected by proxy for '{uri}'")]
    DispatchRejected { uri: String, name: String },

    #[error("unknown live data object: {0}")]
    UnknownLiveDataObject(String),

    #[error("live data object '{object}' does not belong to extension '{uri}'")]
    LiveDataTargetMismatch { object: String, uri: String },

    #[error("operation '{operation}' not valid for {kind} object '{object}'")]
    OperationMismatch {
        object: String,
        operation: &'static str,
        kind: &'static str,
    },

    #[error("unrecognized operation for object '{object}': {detail}")]
    UnrecognizedOperation { object: String, detail: String },

    #[error("index {index} out of bounds for object '{object}' of length {len}")]
    IndexOutOfBounds {
        object: String,
        index: usize,
        len: usize,
    },

    #[error("key '{key}' not present in object '{object}'")]
    UnknownKey { object: String, key: String },

    #[error("invalid extension schema: {0}")]
    InvalidSchema(String),
}
