//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Autoflush delay must be between 1 and 10000 ms")]
    InvalidAutoflushDelay,

    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("View '{view}' referenced by {referenced_by} is not configured")]
    UnknownView { referenced_by: String, view: String },

    #[error("View '{view}' has an invalid source: {reason}")]
    InvalidViewSource { view: String, reason: String },

    #[error("User '{user}' has an invalid password record: {reason}")]
    InvalidPassword { user: String, reason: String },
}
