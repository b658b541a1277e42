//! Router Registry
//!
//! Maps the operator-supplied `router.type` to the factory for that API
//! dialect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::drivers::iptime::IpTimeFactory;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::{RouterControl, RouterFactory};
use crate::vault::credentials::RouterSettings;

/// Registry that holds all available router dialects
pub struct RouterRegistry {
    factories: HashMap<String, Arc<dyn RouterFactory>>,
}

impl RouterRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in dialect
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IpTimeFactory));
        registry
    }

    /// Registers a factory under its `router_type()`; later registrations win
    pub fn register(&mut self, factory: Arc<dyn RouterFactory>) {
        let id = factory.router_type().to_ascii_lowercase();
        self.factories.insert(id, factory);
    }

    pub fn get(&self, router_type: &str) -> Option<Arc<dyn RouterFactory>> {
        self.factories
            .get(&router_type.trim().to_ascii_lowercase())
            .cloned()
    }

    /// Builds a fresh client for one target run
    pub fn create(
        &self,
        router: &RouterSettings,
        request_timeout: Duration,
    ) -> EngineResult<Box<dyn RouterControl>> {
        let factory = self
            .get(&router.kind)
            .ok_or_else(|| EngineError::router_not_supported(&router.kind, &self.list()))?;
        factory.create(&router.url, request_timeout)
    }

    /// Lists all registered router types, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: &str) -> RouterSettings {
        RouterSettings {
            kind: kind.to_string(),
            url: "http://192.168.0.1".to_string(),
        }
    }

    #[test]
    fn builtin_registry_knows_iptime() {
        let registry = RouterRegistry::with_builtin();
        assert_eq!(registry.list(), vec!["iptime"]);
        assert!(registry.get("ipTIME").is_some());
        assert!(registry
            .create(&settings("iptime"), Duration::from_secs(10))
            .is_ok());
    }

    #[test]
    fn unknown_dialect_is_reported() {
        let registry = RouterRegistry::with_builtin();
        let err = registry
            .create(&settings("asus"), Duration::from_secs(10))
            .err()
            .expect("should fail");
        assert!(matches!(&err, EngineError::RouterNotSupported { router_type, .. } if router_type == "asus"));
        assert_eq!(
            err.to_string(),
            "Router type not supported: asus (known: iptime)"
        );
    }
}
