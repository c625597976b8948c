//! Event bus configuration

use serde::Deserialize;

/// Event bus connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct EventBusConfig {
    /// Client name announced to the bus
    #[serde(default = "default_name")]
    pub name: String,

    /// Run the serving stack only while the bus reports operational status
    #[serde(default)]
    pub require_operational: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            require_operational: false,
        }
    }
}

fn default_name() -> String {
    "opview".to_string()
}
