//! URI -> proxy lookup table.

use crate::proxy::ExtensionProxy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Registry of extension proxies, keyed by every URI each proxy services.
///
/// Registrar entries outlive any one mediator session; the mediator holds
/// the registrar by `Arc` and resolves proxies per document load.
#[derive(Default)]
pub struct ExtensionRegistrar {
    proxies: RwLock<HashMap<String, Arc<dyn ExtensionProxy>>>,
}

impl ExtensionRegistrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proxy under every URI it services. A URI already present
    /// keeps its existing proxy.
    pub fn register_proxy(&self, proxy: Arc<dyn ExtensionProxy>) {
        let mut proxies = self.proxies.write().expect("registrar lock");
        for uri in proxy.uris() {
            if proxies.contains_key(&uri) {
                debug!(%uri, "proxy already registered for uri, keeping existing");
                continue;
            }
            proxies.insert(uri, Arc::clone(&proxy));
        }
    }

    /// Returns the proxy servicing `uri`, if any.
    pub fn get_proxy(&self, uri: &str) -> Option<Arc<dyn ExtensionProxy>> {
        self.proxies.read().expect("registrar lock").get(uri).cloned()
    }

    /// Whether some proxy services `uri`.
    pub fn has_proxy(&self, uri: &str) -> bool {
        self.proxies.read().expect("registrar lock").contains_key(uri)
    }

    /// Number of registered URIs.
    pub fn uri_count(&self) -> usize {
        self.proxies.read().expect("registrar lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{Extension, LocalExtensionProxy};
    use crate::protocol::{
        CommandRequest, RegistrationFailure, RegistrationRequest, RegistrationSuccess,
    };
    use crate::schema::ExtensionSchema;
    use std::collections::BTreeSet;

    struct MultiUri;

    impl Extension for MultiUri {
        fn uris(&self) -> BTreeSet<String> {
            BTreeSet::from(["ext:a:1".to_string(), "ext:b:1".to_string()])
        }

        fn create_registration(
            &self,
            uri: &str,
            _request: &RegistrationRequest,
        ) -> Result<RegistrationSuccess, RegistrationFailure> {
            Ok(RegistrationSuccess::new(
                uri,
                "token",
                ExtensionSchema::new(uri),
            ))
        }

        fn invoke_command(&self, _uri: &str, _command: &CommandRequest) -> bool {
            true
        }
    }

    #[test]
    fn registers_every_uri_of_a_proxy() {
        let registrar = ExtensionRegistrar::new();
        registrar.register_proxy(Arc::new(LocalExtensionProxy::new(Arc::new(MultiUri))));

        assert_eq!(registrar.uri_count(), 2);
        assert!(registrar.has_proxy("ext:a:1"));
        assert!(registrar.has_proxy("ext:b:1"));
        assert!(!registrar.has_proxy("ext:c:1"));
        assert!(registrar.get_proxy("ext:a:1").is_some());
    }

    #[test]
    fn first_registration_wins_per_uri() {
        let registrar = ExtensionRegistrar::new();
        let first: Arc<dyn crate::proxy::ExtensionProxy> =
            Arc::new(LocalExtensionProxy::new(Arc::new(MultiUri)));
        registrar.register_proxy(Arc::clone(&first));
        registrar.register_proxy(Arc::new(LocalExtensionProxy::new(Arc::new(MultiUri))));

        let resolved = registrar.get_proxy("ext:a:1").unwrap();
        assert!(Arc::ptr_eq(&resolved, &first));
    }
}
