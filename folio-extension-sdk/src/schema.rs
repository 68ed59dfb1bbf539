//! Raw schema document returned by a successful registration.
//!
//! The schema declares the commands, events, and live-data bindings an
//! extension offers. The model is deliberately lenient where the wire format
//! is: type properties may be a bare type-name string or a full object,
//! `requireResponse` may be a boolean or the strings `"true"`/`"false"`, and
//! a command payload may be a type name or an object carrying a `type`
//! field. The host parses this model into immutable definition tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema document declared by an extension for one URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionSchema {
    /// Schema version.
    pub version: String,
    /// URI the schema belongs to. Optional on the wire; the registration
    /// response's own `uri` field is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Named property-type records referenced by commands and live data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDefinition>,
    /// Declared commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandSchema>,
    /// Declared inbound event names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventSchema>,
    /// Declared live-data bindings.
    #[serde(default, rename = "liveData", skip_serializing_if = "Vec::is_empty")]
    pub live_data: Vec<LiveDataSchema>,
}

impl ExtensionSchema {
    /// Creates an empty schema for `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            uri: Some(uri.into()),
            types: Vec::new(),
            commands: Vec::new(),
            events: Vec::new(),
            live_data: Vec::new(),
        }
    }

    /// Adds a named type record.
    pub fn with_type(mut self, type_def: TypeDefinition) -> Self {
        self.types.push(type_def);
        self
    }

    /// Adds a command declaration.
    pub fn with_command(mut self, command: CommandSchema) -> Self {
        self.commands.push(command);
        self
    }

    /// Adds an event declaration.
    pub fn with_event(mut self, name: impl Into<String>) -> Self {
        self.events.push(EventSchema {
            name: name.into(),
            mode: None,
        });
        self
    }

    /// Adds a live-data binding.
    pub fn with_live_data(mut self, live_data: LiveDataSchema) -> Self {
        self.live_data.push(live_data);
        self
    }

    /// Looks up a named type record.
    pub fn find_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }
}

/// A named record of property declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// Type name referenced by commands and live-data bindings.
    pub name: String,
    /// Property name -> declaration. A declaration is either a bare
    /// type-name string or an object with `type`/`required`/`default`.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl TypeDefinition {
    /// Creates an empty type record.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property declaration.
    pub fn with_property(mut self, name: impl Into<String>, declaration: Value) -> Self {
        self.properties.insert(name.into(), declaration);
        self
    }
}

/// Parsed view of one property declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeProperty {
    /// Whether the property must be supplied (or defaulted) on invocation.
    pub required: bool,
    /// Declared default value, if any.
    pub default: Option<Value>,
}

impl TypeProperty {
    /// Interprets a raw property declaration. A bare type-name string means
    /// an optional property with no default.
    pub fn from_declaration(declaration: &Value) -> Self {
        match declaration {
            Value::Object(fields) => Self {
                required: fields.get("required").map(truthy).unwrap_or(false),
                default: fields.get("default").cloned(),
            },
            _ => Self {
                required: false,
                default: None,
            },
        }
    }
}

/// One declared command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSchema {
    /// Command name.
    pub name: String,
    /// Whether the calling action must wait for extension resolution.
    /// Boolean or the strings `"true"`/`"false"` on the wire.
    #[serde(
        default,
        rename = "requireResponse",
        skip_serializing_if = "Value::is_null"
    )]
    pub require_response: Value,
    /// Payload type: a type name or an object with a `type` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl CommandSchema {
    /// Creates a fire-and-forget command with no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            require_response: Value::Null,
            payload: None,
        }
    }

    /// Requires extension resolution before the calling action completes.
    pub fn require_response(mut self) -> Self {
        self.require_response = Value::Bool(true);
        self
    }

    /// References a named payload type.
    pub fn with_payload(mut self, type_name: impl Into<String>) -> Self {
        self.payload = Some(Value::String(type_name.into()));
        self
    }

    /// Whether the command requires resolution.
    pub fn requires_resolution(&self) -> bool {
        truthy(&self.require_response)
    }

    /// The referenced payload type name, if any.
    pub fn payload_type(&self) -> Option<&str> {
        match self.payload.as_ref()? {
            Value::String(name) => Some(name),
            Value::Object(fields) => fields.get("type").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// One declared inbound event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSchema {
    /// Event name the document may bind a handler to.
    pub name: String,
    /// Optional delivery mode hint; unused by the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

/// One declared live-data binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveDataSchema {
    /// Bound object name in the document's variable environment.
    pub name: String,
    /// `"Name[]"` declares an array of `Name`; a bare name declares a map.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Operation-kind key (`add`/`update`/`set`/`remove`) -> handler policy.
    #[serde(default)]
    pub events: BTreeMap<String, LiveDataEventSchema>,
}

impl LiveDataSchema {
    /// Declares an array binding of the given element type.
    pub fn array(name: impl Into<String>, element_type: &str) -> Self {
        Self {
            name: name.into(),
            data_type: format!("{element_type}[]"),
            events: BTreeMap::new(),
        }
    }

    /// Declares a map binding of the given type.
    pub fn map(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: type_name.into(),
            events: BTreeMap::new(),
        }
    }

    /// Maps an operation kind to an event handler.
    pub fn on(mut self, op_kind: impl Into<String>, event: LiveDataEventSchema) -> Self {
        self.events.insert(op_kind.into(), event);
        self
    }

    /// Whether the binding declares an array.
    pub fn is_array(&self) -> bool {
        self.data_type.ends_with("[]")
    }
}

/// Handler and property policies for one operation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveDataEventSchema {
    /// Declared event handler name fired for this operation kind.
    #[serde(rename = "eventHandler")]
    pub event_handler: String,
    /// Per-property update/collapse policies; the `"*"` entry supplies the
    /// default for unlisted properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<LiveDataPropertySchema>,
}

impl LiveDataEventSchema {
    /// Creates a policy firing `handler` with no property overrides.
    pub fn handler(handler: impl Into<String>) -> Self {
        Self {
            event_handler: handler.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property policy.
    pub fn with_property(mut self, property: LiveDataPropertySchema) -> Self {
        self.properties.push(property);
        self
    }
}

/// Declared update/collapse policy for one property name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveDataPropertySchema {
    /// Property name, or `"*"` for the default entry.
    pub name: String,
    /// Whether changes to the property appear in `event.changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,
    /// Whether multiple changes in one batch coalesce into one entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapse: Option<bool>,
}

/// Interprets a lenient boolean: JSON `true` or the string `"true"`.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
