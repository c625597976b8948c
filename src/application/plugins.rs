//! PluginRegistry - static table of adapter plugins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::latest::LatestAdapterFactory;
use crate::config::AdapterConfig;
use crate::domain::event::Subscription;
use crate::domain::foundation::DomainError;
use crate::ports::{AdapterFactory, SchemaValidator};

/// Maps configured `module` keys to adapter factories.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the plugins shipped with the server.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("latest", Arc::new(LatestAdapterFactory));
        registry
    }

    /// Registers a factory, replacing any previous one under `key`.
    pub fn register(&mut self, key: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        self.factories.insert(key.into(), factory);
    }

    /// Resolves a module key.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown keys.
    pub fn get(&self, key: &str) -> Result<Arc<dyn AdapterFactory>, DomainError> {
        self.factories.get(key).cloned().ok_or_else(|| {
            DomainError::configuration(format!("unknown adapter module '{}'", key))
                .with_detail("module", key)
        })
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Checks that every adapter resolves and passes its plugin's schema.
    pub fn validate_adapters(
        &self,
        adapters: &[AdapterConfig],
        validator: &dyn SchemaValidator,
    ) -> Result<(), DomainError> {
        for adapter in adapters {
            let factory = self.get(&adapter.module)?;
            if let Some(schema) = factory.json_schema() {
                validator.validate(&schema, &adapter.conf()).map_err(|e| {
                    DomainError::configuration(format!(
                        "adapter '{}' configuration is invalid: {}",
                        adapter.name, e
                    ))
                })?;
            }
            factory.create_subscription(&adapter.conf())?;
        }
        Ok(())
    }

    /// Union of all adapter subscriptions, as requested from the event bus.
    pub fn subscription(&self, adapters: &[AdapterConfig]) -> Result<Subscription, DomainError> {
        let subscriptions = adapters
            .iter()
            .map(|adapter| {
                self.get(&adapter.module)?
                    .create_subscription(&adapter.conf())
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Subscription::union(&subscriptions))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("modules", &self.keys())
            .finish()
    }
}
