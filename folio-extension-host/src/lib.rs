//! Extension mediator for Folio documents.
//!
//! Registers document-requested extensions through their proxies, validates
//! and dispatches commands against the declared schemas, routes
//! extension-generated events to document handlers, and reconciles live data
//! update batches atomically into bound data objects.
//!
//! All extension responses flow through a pluggable executor, so the host
//! decides whether resolution happens inline or on a deferred queue.

mod content;
mod definitions;
mod environment;
mod error;
mod livedata;
mod mediator;
mod reconcile;

pub use content::{DocumentContent, ExtensionRequest, SessionConfig};
pub use definitions::{
    parse_schema, CommandProperty, ExtensionCommandDefinition, ExtensionEventHandlerDefinition,
    LiveDataEventPolicy, LiveDataKind, LiveDataObjectDefinition, ParsedSchema, PropertyPolicy,
};
pub use environment::{DocumentEnvironment, EventHandlerInvocation};
pub use error::ExtensionHostError;
pub use livedata::{LiveDataContainer, LiveDataHandle};
pub use mediator::{CommandOutcome, CommandTicket, ExtensionMediator, ExtensionState};
