//! View module - static client bundles with their configuration.
//!
//! A view is materialised from a directory: every file becomes an entry of
//! the view's file map, keyed by its `/`-separated path relative to the view
//! root. How a file is represented depends on its extension, see
//! [`ViewFile::decode`].
//!
//! Markup (`.xml`, `.svg`) is delivered as source text and left for the
//! client to parse; no virtual-tree form is produced on the server.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use serde_json::{Map, Value};

use crate::domain::foundation::{DomainError, ErrorCode};

/// File names that hold the view's configuration schema, in lookup order.
pub const SCHEMA_FILE_NAMES: [&str; 3] = ["schema.json", "schema.yaml", "schema.yml"];

/// One file of a view bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewFile {
    Text(String),
    Data(Value),
    Binary(Vec<u8>),
}

impl ViewFile {
    /// Decodes raw file content according to the extension of `path`.
    ///
    /// - `.js .css .txt .html .xml .svg` - UTF-8 text
    /// - `.json .yaml .yml .toml` - structured data
    /// - anything else - binary
    pub fn decode(path: &str, bytes: Vec<u8>) -> Result<Self, DomainError> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let invalid = |reason: String| {
            DomainError::new(ErrorCode::InvalidView, format!("cannot decode '{}': {}", path, reason))
        };

        match ext.as_str() {
            "js" | "css" | "txt" | "html" | "xml" | "svg" => String::from_utf8(bytes)
                .map(ViewFile::Text)
                .map_err(|e| invalid(e.to_string())),
            "json" => serde_json::from_slice(&bytes)
                .map(ViewFile::Data)
                .map_err(|e| invalid(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_slice(&bytes)
                .map(ViewFile::Data)
                .map_err(|e| invalid(e.to_string())),
            "toml" => {
                let text = String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
                let table: toml::Value = toml::from_str(&text).map_err(|e| invalid(e.to_string()))?;
                serde_json::to_value(table)
                    .map(ViewFile::Data)
                    .map_err(|e| invalid(e.to_string()))
            }
            _ => Ok(ViewFile::Binary(bytes)),
        }
    }

    /// JSON form sent to clients. Binary content is base64 encoded.
    pub fn to_json(&self) -> Value {
        match self {
            ViewFile::Text(text) => Value::String(text.clone()),
            ViewFile::Data(value) => value.clone(),
            ViewFile::Binary(bytes) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }
}

/// Materialised view.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub conf: Value,
    pub files: BTreeMap<String, ViewFile>,
}

impl View {
    /// Returns the configuration schema bundled with the view, if any.
    pub fn schema(&self) -> Option<&Value> {
        SCHEMA_FILE_NAMES.iter().find_map(|name| match self.files.get(*name) {
            Some(ViewFile::Data(schema)) => Some(schema),
            _ => None,
        })
    }

    /// File map as sent in the `init` notification.
    pub fn data_json(&self) -> Value {
        let map: Map<String, Value> = self
            .files
            .iter()
            .map(|(path, file)| (path.clone(), file.to_json()))
            .collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_extensions_decode_to_strings() {
        let file = ViewFile::decode("main.js", b"let x = 1;".to_vec()).unwrap();
        assert_eq!(file, ViewFile::Text("let x = 1;".to_string()));
    }

    #[test]
    fn svg_stays_text() {
        let file = ViewFile::decode("img/logo.SVG", b"<svg/>".to_vec()).unwrap();
        assert_eq!(file.to_json(), json!("<svg/>"));
    }

    #[test]
    fn structured_extensions_decode_to_values() {
        let json_file = ViewFile::decode("a.json", br#"{"a": 1}"#.to_vec()).unwrap();
        let yaml_file = ViewFile::decode("a.yaml", b"a: 1\n".to_vec()).unwrap();
        let toml_file = ViewFile::decode("a.toml", b"a = 1\n".to_vec()).unwrap();

        assert_eq!(json_file.to_json(), json!({"a": 1}));
        assert_eq!(yaml_file.to_json(), json!({"a": 1}));
        assert_eq!(toml_file.to_json(), json!({"a": 1}));
    }

    #[test]
    fn unknown_extension_is_base64() {
        let file = ViewFile::decode("font.woff", vec![0, 1, 2]).unwrap();
        assert_eq!(file.to_json(), json!("AAEC"));
    }

    #[test]
    fn malformed_json_is_invalid_view() {
        let err = ViewFile::decode("broken.json", b"{".to_vec()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidView);
    }

    #[test]
    fn schema_is_found_by_name() {
        let mut files = BTreeMap::new();
        files.insert(
            "schema.yaml".to_string(),
            ViewFile::Data(json!({"type": "object"})),
        );
        let view = View {
            name: "v".to_string(),
            conf: Value::Null,
            files,
        };

        assert_eq!(view.schema(), Some(&json!({"type": "object"})));
    }

    #[test]
    fn data_json_maps_paths_to_contents() {
        let mut files = BTreeMap::new();
        files.insert("index.js".to_string(), ViewFile::Text("x".to_string()));
        let view = View {
            name: "v".to_string(),
            conf: json!({}),
            files,
        };

        assert_eq!(view.data_json(), json!({"index.js": "x"}));
    }
}
