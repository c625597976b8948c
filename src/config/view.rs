//! View configuration

use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

use super::error::ValidationError;

/// One configured view.
///
/// The source is either a directory (`view_path`) or the name of a built-in
/// view. Configuration is inline (`conf`) or read from `conf_path`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewConfig {
    pub name: String,
    pub view_path: Option<PathBuf>,
    pub builtin: Option<String>,
    pub conf_path: Option<PathBuf>,
    pub conf: Option<Value>,
}

impl ViewConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidViewSource {
            view: self.name.clone(),
            reason: reason.to_string(),
        };

        match (&self.view_path, &self.builtin) {
            (Some(_), Some(_)) => return Err(invalid("both view_path and builtin set")),
            (None, None) => return Err(invalid("neither view_path nor builtin set")),
            _ => {}
        }

        if self.conf_path.is_some() && self.conf.is_some() {
            return Err(invalid("both conf_path and conf set"));
        }

        Ok(())
    }
}
