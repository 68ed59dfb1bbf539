//! Convenience re-exports for extension authors.

pub use crate::executor::{ChannelExecutor, Executor, InlineExecutor, Task};
pub use crate::extension::{Extension, LocalExtensionProxy};
pub use crate::protocol::{
    CommandError, CommandRequest, EventMessage, LiveDataOperation, LiveDataUpdateMessage,
    RegistrationFailure, RegistrationRequest, RegistrationSuccess, PROTOCOL_VERSION,
};
pub use crate::proxy::ExtensionProxy;
pub use crate::registrar::ExtensionRegistrar;
pub use crate::schema::{
    CommandSchema, EventSchema, ExtensionSchema, LiveDataEventSchema, LiveDataPropertySchema,
    LiveDataSchema, TypeDefinition, TypeProperty,
};
