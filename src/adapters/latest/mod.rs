//! Latest adapter plugin.
//!
//! Keeps the newest event of every configured event type and replicates it
//! to the sessions of authorized users:
//!
//! ```yaml
//! - name: latest
//!   module: latest
//!   authorized_roles: [operator]
//!   items:
//!     - key: temperature
//!       event_type: [plant, sensor, temperature]
//! ```
//!
//! Session state is an object keyed by item key. Each entry holds the event
//! timestamp, source timestamp (seconds, as floats) and payload. Users
//! without an authorized role see an empty object.

mod adapter;

pub use adapter::{LatestAdapter, LatestSession};

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::event::{EventType, Subscription};
use crate::domain::foundation::DomainError;
use crate::ports::{Adapter, AdapterFactory, EventBusClient};

/// Configuration section of a latest adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestConfig {
    #[serde(default)]
    pub authorized_roles: Vec<String>,
    pub items: Vec<LatestItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestItem {
    pub key: String,
    pub event_type: Vec<String>,
}

impl LatestConfig {
    fn parse(conf: &Value) -> Result<Self, DomainError> {
        LatestConfig::deserialize(conf).map_err(|e| {
            DomainError::configuration(format!("invalid latest adapter configuration: {}", e))
        })
    }
}

static CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["items"],
        "properties": {
            "authorized_roles": {
                "type": "array",
                "items": {"type": "string"}
            },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["key", "event_type"],
                    "properties": {
                        "key": {"type": "string"},
                        "event_type": {
                            "type": "array",
                            "items": {"type": "string"}
                        }
                    }
                }
            }
        }
    })
});

/// Factory registered under the `latest` module key.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestAdapterFactory;

#[async_trait]
impl AdapterFactory for LatestAdapterFactory {
    fn json_schema(&self) -> Option<Value> {
        Some(CONFIG_SCHEMA.clone())
    }

    fn create_subscription(&self, conf: &Value) -> Result<Subscription, DomainError> {
        let conf = LatestConfig::parse(conf)?;
        Subscription::new(
            conf.items
                .into_iter()
                .map(|item| EventType::new(item.event_type)),
        )
        .map_err(|e| DomainError::configuration(e.to_string()))
    }

    async fn create_adapter(
        &self,
        conf: &Value,
        client: Arc<dyn EventBusClient>,
    ) -> Result<Arc<dyn Adapter>, DomainError> {
        let conf = LatestConfig::parse(conf)?;
        let adapter = LatestAdapter::create(conf, client.as_ref()).await?;
        Ok(Arc::new(adapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_covers_configured_types() {
        let subscription = LatestAdapterFactory
            .create_subscription(&json!({
                "authorized_roles": [],
                "items": [
                    {"key": "a", "event_type": ["a", "1"]},
                    {"key": "b", "event_type": ["b", "*"]}
                ]
            }))
            .unwrap();

        assert!(subscription.matches(&EventType::from(["a", "1"])));
        assert!(subscription.matches(&EventType::from(["b", "2", "3"])));
        assert!(!subscription.matches(&EventType::from(["a", "2"])));
    }

    #[test]
    fn empty_items_give_empty_subscription() {
        let subscription = LatestAdapterFactory
            .create_subscription(&json!({"items": []}))
            .unwrap();

        assert!(subscription.is_empty());
    }

    #[test]
    fn missing_items_is_configuration_error() {
        let err = LatestAdapterFactory
            .create_subscription(&json!({"authorized_roles": []}))
            .unwrap_err();

        assert_eq!(err.code, crate::domain::foundation::ErrorCode::ConfigurationError);
    }
}
