//! JSON Schema Validator - Implementation of SchemaValidator.
//!
//! Walks the schema manually, without an external schema engine. Supported
//! keywords: `type`, `enum`, `const`, `required`, `properties`,
//! `additionalProperties`, `items`, `minItems`, `maxItems`, `minimum`,
//! `maximum`, `minLength`, `maxLength`, `allOf`, `anyOf`, `oneOf` and local
//! `$ref` pointers (`#/...`). Unknown keywords are ignored.

use serde_json::{Map, Value};

use crate::ports::{SchemaValidationError, SchemaValidator};

/// JSON Schema-based validator implementation.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` and can be shared across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

const MAX_REF_DEPTH: usize = 32;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self
    }

    fn validate_node(
        &self,
        root: &Value,
        schema: &Value,
        value: &Value,
        path: &str,
        depth: usize,
        errors: &mut Vec<SchemaValidationError>,
    ) {
        let schema = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                errors.push(SchemaValidationError::Generic {
                    message: format!("{} is not allowed", path),
                });
                return;
            }
            Value::Object(obj) => obj,
            _ => {
                errors.push(SchemaValidationError::UnsupportedSchema {
                    path: path.to_string(),
                    reason: "schema must be an object or boolean".to_string(),
                });
                return;
            }
        };

        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if depth >= MAX_REF_DEPTH {
                errors.push(SchemaValidationError::UnsupportedSchema {
                    path: path.to_string(),
                    reason: "reference nesting too deep".to_string(),
                });
                return;
            }
            match resolve_ref(root, reference) {
                Some(target) => self.validate_node(root, target, value, path, depth + 1, errors),
                None => errors.push(SchemaValidationError::UnsupportedSchema {
                    path: path.to_string(),
                    reason: format!("unresolved reference {}", reference),
                }),
            }
        }

        if let Some(expected) = schema.get("type") {
            if !type_matches(expected, value) {
                errors.push(SchemaValidationError::InvalidType {
                    field: path.to_string(),
                    expected: type_list(expected),
                    actual: Self::type_name(value).to_string(),
                });
                return;
            }
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                errors.push(SchemaValidationError::NotAllowed {
                    field: path.to_string(),
                    allowed: Value::Array(allowed.clone()).to_string(),
                });
            }
        }

        if let Some(constant) = schema.get("const") {
            if constant != value {
                errors.push(SchemaValidationError::NotAllowed {
                    field: path.to_string(),
                    allowed: constant.to_string(),
                });
            }
        }

        match value {
            Value::Object(obj) => self.validate_object(root, schema, obj, path, depth, errors),
            Value::Array(items) => self.validate_array(root, schema, items, path, depth, errors),
            Value::Number(n) => validate_range(schema, n.as_f64().unwrap_or(f64::NAN), path, errors),
            Value::String(s) => validate_length(schema, s.chars().count(), path, errors),
            _ => {}
        }

        self.validate_combinators(root, schema, value, path, depth, errors);
    }

    fn validate_object(
        &self,
        root: &Value,
        schema: &Map<String, Value>,
        obj: &Map<String, Value>,
        path: &str,
        depth: usize,
        errors: &mut Vec<SchemaValidationError>,
    ) {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(field) {
                    errors.push(SchemaValidationError::MissingRequired {
                        field: join_path(path, field),
                    });
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        for (key, child) in obj {
            let child_path = join_path(path, key);
            match properties.and_then(|p| p.get(key)) {
                Some(child_schema) => {
                    self.validate_node(root, child_schema, child, &child_path, depth, errors)
                }
                None => match schema.get("additionalProperties") {
                    Some(Value::Bool(false)) => {
                        errors.push(SchemaValidationError::UnexpectedField { field: child_path })
                    }
                    Some(additional @ Value::Object(_)) => {
                        self.validate_node(root, additional, child, &child_path, depth, errors)
                    }
                    _ => {}
                },
            }
        }
    }

    fn validate_array(
        &self,
        root: &Value,
        schema: &Map<String, Value>,
        items: &[Value],
        path: &str,
        depth: usize,
        errors: &mut Vec<SchemaValidationError>,
    ) {
        let min = schema.get("minItems").and_then(Value::as_u64);
        let max = schema.get("maxItems").and_then(Value::as_u64);
        let len = items.len() as u64;
        if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
            errors.push(SchemaValidationError::ArrayLength {
                field: path.to_string(),
                min: min.unwrap_or(0) as usize,
                max: max.map_or_else(|| "inf".to_string(), |m| m.to_string()),
                actual: items.len(),
            });
        }

        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                self.validate_node(root, item_schema, item, &item_path, depth, errors);
            }
        }
    }

    fn validate_combinators(
        &self,
        root: &Value,
        schema: &Map<String, Value>,
        value: &Value,
        path: &str,
        depth: usize,
        errors: &mut Vec<SchemaValidationError>,
    ) {
        if let Some(all) = schema.get("allOf").and_then(Value::as_array) {
            for sub in all {
                self.validate_node(root, sub, value, path, depth, errors);
            }
        }

        let passing = |subs: &Vec<Value>| {
            subs.iter()
                .filter(|sub| {
                    let mut sub_errors = Vec::new();
                    self.validate_node(root, sub, value, path, depth, &mut sub_errors);
                    sub_errors.is_empty()
                })
                .count()
        };

        if let Some(any) = schema.get("anyOf").and_then(Value::as_array) {
            if passing(any) == 0 {
                errors.push(SchemaValidationError::Generic {
                    message: format!("{} matches none of anyOf", path),
                });
            }
        }

        if let Some(one) = schema.get("oneOf").and_then(Value::as_array) {
            let count = passing(one);
            if count != 1 {
                errors.push(SchemaValidationError::Generic {
                    message: format!("{} matches {} of oneOf, expected exactly 1", path, count),
                });
            }
        }
    }

    fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn collect_errors(mut errors: Vec<SchemaValidationError>) -> Result<(), SchemaValidationError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(SchemaValidationError::Multiple(errors)),
        }
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), SchemaValidationError> {
        let mut errors = Vec::new();
        self.validate_node(schema, schema, instance, "", 0, &mut errors);
        Self::collect_errors(errors)
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    let single = |name: &str| match name {
        "null" | "boolean" | "string" | "array" | "object" => {
            JsonSchemaValidator::type_name(value) == name
        }
        "number" => value.is_number(),
        "integer" => value.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    };

    match expected {
        Value::String(name) => single(name.as_str()),
        Value::Array(names) => names.iter().filter_map(Value::as_str).any(single),
        _ => true,
    }
}

fn type_list(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn validate_range(
    schema: &Map<String, Value>,
    n: f64,
    path: &str,
    errors: &mut Vec<SchemaValidationError>,
) {
    let min = schema.get("minimum").and_then(Value::as_f64);
    let max = schema.get("maximum").and_then(Value::as_f64);
    if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
        errors.push(SchemaValidationError::OutOfRange {
            field: path.to_string(),
            value: n.to_string(),
            min: min.map_or_else(|| "-inf".to_string(), |m| m.to_string()),
            max: max.map_or_else(|| "inf".to_string(), |m| m.to_string()),
        });
    }
}

fn validate_length(
    schema: &Map<String, Value>,
    len: usize,
    path: &str,
    errors: &mut Vec<SchemaValidationError>,
) {
    let min = schema.get("minLength").and_then(Value::as_u64);
    let max = schema.get("maxLength").and_then(Value::as_u64);
    let len = len as u64;
    if min.is_some_and(|m| len < m) || max.is_some_and(|m| len > m) {
        errors.push(SchemaValidationError::Generic {
            message: format!("{} has length {} outside of the allowed range", path, len),
        });
    }
}

fn join_path(parent: &str, field: &str) -> String {
    if parent.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", parent, field)
    }
}

fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(root);
    }
    root.pointer(pointer)
}
