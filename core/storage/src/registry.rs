//! Provider registry for dynamic provider resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::StorageProvider;
use keyward_common::{Error, Result};

/// Factory function type for creating providers.
pub type ProviderFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// Registry for storage provider factories.
///
/// Allows hosts to pick the backend of each storage area by name and
/// configuration.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a provider by name and configuration.
    ///
    /// # Errors
    /// - Provider not found
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StorageProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered provider names.
    pub fn providers(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in providers.
///
/// - `memory`: no configuration
/// - `local`: `{"root": "<directory>"}`
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryProvider::new()))),
    );

    registry.factories.insert(
        "local".to_string(),
        Box::new(|config| {
            let root = config.get("root").and_then(|v| v.as_str()).ok_or_else(|| {
                Error::InvalidInput("Local provider requires 'root' path".to_string())
            })?;
            Ok(Arc::new(crate::local::LocalProvider::new(root)?))
        }),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryProvider::new()))))
            .unwrap();

        let provider = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(provider.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryProvider::new()))))
            .unwrap();

        let result = registry.register("test", Box::new(|_| Ok(Arc::new(MemoryProvider::new()))));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.resolve("unknown", Value::Null),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry();
        assert!(registry.has_provider("memory"));
        assert!(registry.has_provider("local"));

        let mut names = registry.providers();
        names.sort();
        assert_eq!(names, vec!["local".to_string(), "memory".to_string()]);
    }

    #[test]
    fn test_local_requires_root() {
        let registry = create_default_registry();
        assert!(matches!(
            registry.resolve("local", Value::Null),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_local_resolves_with_root() {
        let temp = tempfile::TempDir::new().unwrap();
        let registry = create_default_registry();
        let provider = registry
            .resolve("local", serde_json::json!({ "root": temp.path() }))
            .unwrap();
        assert_eq!(provider.name(), "local");
    }
}
