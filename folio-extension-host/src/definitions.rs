//! Immutable definition tables parsed from a registration schema.
//!
//! A schema is parsed exactly once per URI, on first successful
//! registration. Every definition is namespaced by the URI it came from, so
//! two URIs sharing an identical schema keep fully independent tables.

use crate::error::ExtensionHostError;
use folio_extension_sdk::schema::{ExtensionSchema, TypeProperty};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// One declared command property.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandProperty {
    /// Whether the property must be supplied (or defaulted) on invocation.
    pub required: bool,
    /// Declared default substituted when the caller omits the property.
    pub default_value: Option<Value>,
}

/// One declared command, namespaced by URI.
#[derive(Debug, Clone)]
pub struct ExtensionCommandDefinition {
    pub uri: String,
    pub name: String,
    /// Whether the calling action stays pending until the proxy resolves.
    pub require_resolution: bool,
    /// Declared property name -> requirement/default.
    pub property_map: BTreeMap<String, CommandProperty>,
}

/// One declared inbound event name, namespaced by URI.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionEventHandlerDefinition {
    pub uri: String,
    pub name: String,
}

/// Container kind of a live-data binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveDataKind {
    Array,
    Map,
}

impl LiveDataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveDataKind::Array => "array",
            LiveDataKind::Map => "map",
        }
    }
}

/// Update/collapse policy resolved for one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyPolicy {
    /// Whether changes to the property appear in `event.changed`.
    pub update: bool,
    /// Whether multiple changes in one batch coalesce into one entry.
    pub collapse: bool,
}

impl Default for PropertyPolicy {
    fn default() -> Self {
        Self {
            update: true,
            collapse: true,
        }
    }
}

/// Handler binding and property policies for one operation kind.
#[derive(Debug, Clone)]
pub struct LiveDataEventPolicy {
    /// Declared event handler fired for this operation kind.
    pub handler: String,
    /// Explicit per-property policies; `"*"` supplies the default for
    /// unlisted properties.
    pub property_policies: BTreeMap<String, PropertyPolicy>,
}

impl LiveDataEventPolicy {
    /// Resolves the policy for a property name: explicit entry, then the
    /// `"*"` entry, then the built-in default.
    pub fn policy_for(&self, property: Option<&str>) -> PropertyPolicy {
        if let Some(name) = property {
            if let Some(policy) = self.property_policies.get(name) {
                return *policy;
            }
        }
        self.property_policies
            .get("*")
            .copied()
            .unwrap_or_default()
    }
}

/// One declared live-data binding, namespaced by URI.
#[derive(Debug, Clone)]
pub struct LiveDataObjectDefinition {
    pub uri: String,
    pub name: String,
    pub kind: LiveDataKind,
    /// Operation-kind key (`add`/`update`/`set`/`remove`) -> policy.
    pub event_policy: BTreeMap<String, LiveDataEventPolicy>,
}

impl LiveDataObjectDefinition {
    /// Policy bound to an operation-kind key, if declared.
    pub fn policy(&self, op_key: &str) -> Option<&LiveDataEventPolicy> {
        self.event_policy.get(op_key)
    }
}

/// Definition tables parsed from one URI's schema.
#[derive(Debug, Default)]
pub struct ParsedSchema {
    pub commands: Vec<ExtensionCommandDefinition>,
    pub event_handlers: Vec<ExtensionEventHandlerDefinition>,
    pub live_data: Vec<LiveDataObjectDefinition>,
}

const LIVE_DATA_OP_KEYS: [&str; 5] = ["add", "update", "set", "remove", "clear"];

/// Parses a raw registration schema into the per-URI definition tables.
pub fn parse_schema(uri: &str, schema: &ExtensionSchema) -> Result<ParsedSchema, ExtensionHostError> {
    let mut parsed = ParsedSchema::default();

    for command in &schema.commands {
        let mut property_map = BTreeMap::new();
        if let Some(type_name) = command.payload_type() {
            match schema.find_type(type_name) {
                Some(type_def) => {
                    for (name, declaration) in &type_def.properties {
                        let property = TypeProperty::from_declaration(declaration);
                        property_map.insert(
                            name.clone(),
                            CommandProperty {
                                required: property.required,
                                default_value: property.default,
                            },
                        );
                    }
                }
                None => {
                    return Err(ExtensionHostError::InvalidSchema(format!(
                        "command '{}' references undeclared payload type '{type_name}'",
                        command.name
                    )));
                }
            }
        }
        parsed.commands.push(ExtensionCommandDefinition {
            uri: uri.to_string(),
            name: command.name.clone(),
            require_resolution: command.requires_resolution(),
            property_map,
        });
    }

    for event in &schema.events {
        parsed.event_handlers.push(ExtensionEventHandlerDefinition {
            uri: uri.to_string(),
            name: event.name.clone(),
        });
    }

    for binding in &schema.live_data {
        let kind = if binding.is_array() {
            LiveDataKind::Array
        } else {
            LiveDataKind::Map
        };

        let mut event_policy = BTreeMap::new();
        for (op_key, event) in &binding.events {
            if !LIVE_DATA_OP_KEYS.contains(&op_key.as_str()) {
                warn!(uri, object = %binding.name, op_key, "ignoring unknown live-data operation key");
                continue;
            }
            let mut property_policies = BTreeMap::new();
            for property in &event.properties {
                property_policies.insert(
                    property.name.clone(),
                    PropertyPolicy {
                        update: property.update.unwrap_or(true),
                        collapse: property.collapse.unwrap_or(true),
                    },
                );
            }
            event_policy.insert(
                op_key.clone(),
                LiveDataEventPolicy {
                    handler: event.event_handler.clone(),
                    property_policies,
                },
            );
        }

        parsed.live_data.push(LiveDataObjectDefinition {
            uri: uri.to_string(),
            name: binding.name.clone(),
            kind,
            event_policy,
        });
    }

    Ok(parsed)
}
