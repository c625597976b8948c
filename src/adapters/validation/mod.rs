//! Validation Adapters - Schema validation implementations.
//!
//! Contains the validator used for adapter and view configuration.

mod json_schema_validator;

pub use json_schema_validator::JsonSchemaValidator;
