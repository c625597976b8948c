//! Application configuration module
//!
//! This module provides type-safe configuration loading using the `config`
//! and `dotenvy` crates. A configuration file (YAML, JSON or TOML, chosen by
//! extension) is layered under environment variables with the `OPVIEW`
//! prefix; nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use opview::config::AppConfig;
//! use std::path::Path;
//!
//! let config = AppConfig::load(Some(Path::new("opview.yaml"))).expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod adapter;
mod error;
mod event_bus;
mod server;
mod user;
mod view;

pub use adapter::AdapterConfig;
pub use error::{ConfigError, ValidationError};
pub use event_bus::EventBusConfig;
pub use server::ServerConfig;
pub use user::UserConfig;
pub use view::ViewConfig;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Root application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener, logging and client delivery settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Event bus connection settings
    #[serde(default)]
    pub event_bus: EventBusConfig,

    /// Adapters, in routing order
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,

    #[serde(default)]
    pub users: Vec<UserConfig>,

    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

impl AppConfig {
    /// Load configuration from an optional file and environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads the configuration file, if given
    /// 3. Overrides with environment variables with `OPVIEW` prefix, using
    ///    `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `OPVIEW__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `OPVIEW__EVENT_BUS__REQUIRE_OPERATIONAL=true`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or values cannot be
    /// parsed into expected types.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::default()
                    .prefix("OPVIEW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Performs semantic validation of configuration:
    /// - Listener settings
    /// - Unique adapter, user and view names
    /// - View sources
    /// - Well-formed password records
    /// - Every referenced view is configured
    ///
    /// Adapter modules are checked against the plugin registry separately.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;

        unique_names("adapter", self.adapters.iter().map(|a| a.name.as_str()))?;
        unique_names("user", self.users.iter().map(|u| u.name.as_str()))?;
        unique_names("view", self.views.iter().map(|v| v.name.as_str()))?;

        for view in &self.views {
            view.validate()?;
        }

        for user in &self.users {
            user.password
                .validate()
                .map_err(|e| ValidationError::InvalidPassword {
                    user: user.name.clone(),
                    reason: e.to_string(),
                })?;
        }

        let views: HashSet<&str> = self.views.iter().map(|v| v.name.as_str()).collect();
        if let Some(initial) = &self.server.initial_view {
            if !views.contains(initial.as_str()) {
                return Err(ValidationError::UnknownView {
                    referenced_by: "server.initial_view".to_string(),
                    view: initial.clone(),
                });
            }
        }
        for user in &self.users {
            if let Some(view) = &user.view {
                if !views.contains(view.as_str()) {
                    return Err(ValidationError::UnknownView {
                        referenced_by: format!("user '{}'", user.name),
                        view: view.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn unique_names<'a, I>(kind: &'static str, names: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
