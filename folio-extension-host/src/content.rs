//! Document-side extension inputs.
//!
//! A document requests extensions by URI under a display name of its
//! choosing and may carry a settings block keyed by that display name. The
//! session supplies host flags per URI. Both are assembled by the host and
//! handed to the mediator when loading.

use serde_json::Value;
use std::collections::BTreeMap;

/// One extension request from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
    /// Extension URI, e.g. `folioext:hello:10`.
    pub uri: String,
    /// Name the document refers to the extension by.
    pub display_name: String,
}

impl ExtensionRequest {
    pub fn new(uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            display_name: display_name.into(),
        }
    }
}

/// Extension requests and settings gathered from a document.
#[derive(Debug, Clone, Default)]
pub struct DocumentContent {
    requests: Vec<ExtensionRequest>,
    /// Settings blocks keyed by requested display name.
    settings: BTreeMap<String, Value>,
}

impl DocumentContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: ExtensionRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn with_settings(mut self, display_name: impl Into<String>, settings: Value) -> Self {
        self.settings.insert(display_name.into(), settings);
        self
    }

    pub fn requests(&self) -> &[ExtensionRequest] {
        &self.requests
    }

    /// Settings block for a request, keyed by the request's display name.
    /// Absent settings surface as `Null`.
    pub fn settings_for(&self, request: &ExtensionRequest) -> Value {
        self.settings
            .get(&request.display_name)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Session-scoped host configuration passed along with registration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    flags: BTreeMap<String, Value>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers host flags for an extension URI, replacing any prior value.
    pub fn register_flags(mut self, uri: impl Into<String>, flags: Value) -> Self {
        self.flags.insert(uri.into(), flags);
        self
    }

    /// Flags for a URI; absent flags surface as `Null`.
    pub fn flags_for(&self, uri: &str) -> Value {
        self.flags.get(uri).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn settings_resolve_by_display_name() {
        let content = DocumentContent::new()
            .with_request(ExtensionRequest::new("folioext:hello:10", "Hello"))
            .with_settings("Hello", json!({ "authorizationCode": "MAGIC" }));

        let request = &content.requests()[0];
        assert_eq!(
            content.settings_for(request),
            json!({ "authorizationCode": "MAGIC" })
        );

        let other = ExtensionRequest::new("folioext:goodbye:10", "Goodbye");
        assert_eq!(content.settings_for(&other), Value::Null);
    }

    #[test]
    fn flags_resolve_by_uri() {
        let config = SessionConfig::new().register_flags("folioext:hello:10", json!("--fast"));
        assert_eq!(config.flags_for("folioext:hello:10"), json!("--fast"));
        assert_eq!(config.flags_for("folioext:other:1"), Value::Null);
    }
}
