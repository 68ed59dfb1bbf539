//! Extension-facing API for the Folio document runtime.
//!
//! Extension authors use this crate to implement the [`Extension`] trait and
//! publish it through a [`LocalExtensionProxy`]; hosts resolve proxies via
//! the [`ExtensionRegistrar`]. The crate also defines the wire protocol
//! messages exchanged with out-of-process extensions and the [`Executor`]
//! capability that controls when deferred mediator work runs.
//!
//! # Example
//!
//! ```
//! use folio_extension_sdk::prelude::*;
//! use std::collections::BTreeSet;
//!
//! struct Greeter;
//!
//! impl Extension for Greeter {
//!     fn uris(&self) -> BTreeSet<String> {
//!         BTreeSet::from(["folioext:greeter:1".to_string()])
//!     }
//!
//!     fn create_registration(
//!         &self,
//!         uri: &str,
//!         _request: &RegistrationRequest,
//!     ) -> Result<RegistrationSuccess, RegistrationFailure> {
//!         let schema = ExtensionSchema::new(uri);
//!         Ok(RegistrationSuccess::new(uri, "session-token", schema))
//!     }
//!
//!     fn invoke_command(&self, _uri: &str, _command: &CommandRequest) -> bool {
//!         true
//!     }
//! }
//! ```

pub mod executor;
pub mod extension;
pub mod prelude;
pub mod protocol;
pub mod proxy;
pub mod registrar;
pub mod schema;

pub use executor::{ChannelExecutor, Executor, InlineExecutor, Task};
pub use extension::{Extension, LocalExtensionProxy};
pub use protocol::{
    CommandError, CommandRequest, EventMessage, LiveDataOperation, LiveDataUpdateMessage,
    RegistrationFailure, RegistrationRequest, RegistrationSuccess, PROTOCOL_VERSION,
};
pub use proxy::{
    CommandFailureCallback, CommandSuccessCallback, EventCallback, ExtensionProxy,
    LiveDataCallback, RegistrationFailureCallback, RegistrationSuccessCallback,
};
pub use registrar::ExtensionRegistrar;
pub use schema::{
    CommandSchema, EventSchema, ExtensionSchema, LiveDataEventSchema, LiveDataPropertySchema,
    LiveDataSchema, TypeDefinition, TypeProperty,
};
