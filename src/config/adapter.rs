//! Adapter configuration

use serde::Deserialize;
use serde_json::{Map, Value};

/// One configured adapter.
///
/// Everything besides `name` and `module` belongs to the adapter plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterConfig {
    pub name: String,

    /// Plugin key resolved in the plugin registry
    pub module: String,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl AdapterConfig {
    /// Full configuration section as handed to the plugin.
    pub fn conf(&self) -> Value {
        let mut conf = self.settings.clone();
        conf.insert("name".to_string(), Value::String(self.name.clone()));
        conf.insert("module".to_string(), Value::String(self.module.clone()));
        Value::Object(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conf_includes_name_module_and_settings() {
        let config: AdapterConfig = serde_json::from_value(json!({
            "name": "latest",
            "module": "latest",
            "items": []
        }))
        .unwrap();

        assert_eq!(config.settings.len(), 1);
        assert_eq!(
            config.conf(),
            json!({"name": "latest", "module": "latest", "items": []})
        );
    }
}
