//! Schema Validator Port - configuration validation interface.
//!
//! Adapter plugins and views may ship a JSON Schema for their configuration.
//! The application validates configuration through this trait, while the
//! adapter (`JsonSchemaValidator`) provides the implementation.

use serde_json::Value;
use thiserror::Error;

/// Port for validating JSON values against JSON Schemas.
///
/// # Contract
///
/// Implementations must:
/// - Treat an empty schema (`{}` or `true`) as accepting everything
/// - Report the path of the offending value in every error
/// - Return `Multiple` only when more than one error was found
///
/// # Usage
///
/// ```rust,ignore
/// let validator: &dyn SchemaValidator = &JsonSchemaValidator::new();
/// validator.validate(&schema, &adapter_conf)?;
/// ```
pub trait SchemaValidator: Send + Sync {
    /// Validate `instance` against `schema`.
    ///
    /// Returns `Ok(())` if valid, `Err` with validation errors if not.
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), SchemaValidationError>;
}

/// Errors that can occur during schema validation.
///
/// These errors name schema paths and are meant for operators reading logs.
#[derive(Debug, Clone, Error)]
pub enum SchemaValidationError {
    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid type for field {field}: expected {expected}, got {actual}")]
    InvalidType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Array length out of bounds for field {field}: {actual} not in [{min}, {max}]")]
    ArrayLength {
        field: String,
        min: usize,
        max: String,
        actual: usize,
    },

    #[error("Value out of range for field {field}: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Field {field} must be one of {allowed}")]
    NotAllowed { field: String, allowed: String },

    #[error("Unexpected field: {field}")]
    UnexpectedField { field: String },

    #[error("Unsupported schema at {path}: {reason}")]
    UnsupportedSchema { path: String, reason: String },

    #[error("Schema validation failed: {message}")]
    Generic { message: String },

    #[error("Validation errors: {0:?}")]
    Multiple(Vec<SchemaValidationError>),
}

impl PartialEq for SchemaValidationError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
