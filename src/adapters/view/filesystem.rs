//! Filesystem view directory.
//!
//! Views are materialised from disk on every request, so edits to a view
//! directory are picked up without a restart. Reading runs on the blocking
//! thread pool.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::ViewConfig;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::view::{View, ViewFile};
use crate::ports::{SchemaValidator, ViewProvider};

/// Configured views backed by the filesystem.
pub struct ViewDirectory {
    views: HashMap<String, ViewConfig>,
    builtin_path: Option<PathBuf>,
    validator: Arc<dyn SchemaValidator>,
}

impl ViewDirectory {
    /// Creates the directory.
    ///
    /// Built-in views are looked up as subdirectories of `builtin_path`.
    pub fn new<I>(views: I, builtin_path: Option<PathBuf>, validator: Arc<dyn SchemaValidator>) -> Self
    where
        I: IntoIterator<Item = ViewConfig>,
    {
        Self {
            views: views.into_iter().map(|v| (v.name.clone(), v)).collect(),
            builtin_path,
            validator,
        }
    }

    fn source_path(&self, conf: &ViewConfig) -> Result<PathBuf, DomainError> {
        if let Some(path) = &conf.view_path {
            return Ok(path.clone());
        }
        match (&conf.builtin, &self.builtin_path) {
            (Some(builtin), Some(root)) => Ok(root.join(builtin)),
            (Some(builtin), None) => Err(invalid_view(
                &conf.name,
                format!("built-in view '{}' requested but no builtin_views_path configured", builtin),
            )),
            (None, _) => Err(invalid_view(&conf.name, "view has no source")),
        }
    }
}

#[async_trait]
impl ViewProvider for ViewDirectory {
    async fn get(&self, name: &str) -> Result<View, DomainError> {
        let conf = self.views.get(name).ok_or_else(|| {
            DomainError::new(ErrorCode::ViewNotFound, format!("view '{}' not found", name))
        })?;

        let root = self.source_path(conf)?;
        let conf_path = conf.conf_path.clone();
        let inline_conf = conf.conf.clone();
        let view_name = name.to_string();

        let (files, view_conf) = tokio::task::spawn_blocking(move || {
            let files = read_view_files(&root)?;
            let view_conf = match conf_path {
                Some(path) => read_conf_file(&path)?,
                None => inline_conf.unwrap_or(Value::Null),
            };
            Ok::<_, DomainError>((files, view_conf))
        })
        .await
        .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("view loading failed: {}", e)))?
        .map_err(|e| e.with_detail("view", view_name.clone()))?;

        let view = View {
            name: view_name,
            conf: view_conf,
            files,
        };

        if let Some(schema) = view.schema() {
            self.validator
                .validate(schema, &view.conf)
                .map_err(|e| invalid_view(&view.name, format!("configuration is invalid: {}", e)))?;
        }

        debug!(view = %view.name, files = view.files.len(), "View loaded");
        Ok(view)
    }
}

fn invalid_view(name: &str, reason: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::InvalidView, reason).with_detail("view", name)
}

fn io_error(path: &Path, err: std::io::Error) -> DomainError {
    DomainError::new(
        ErrorCode::InvalidView,
        format!("cannot read '{}': {}", path.display(), err),
    )
}

/// Reads every file below `root`, keyed by its `/`-separated relative path.
fn read_view_files(root: &Path) -> Result<BTreeMap<String, ViewFile>, DomainError> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| io_error(&dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| io_error(&dir, e))?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }

            let relative = relative_name(root, &path);
            let bytes = std::fs::read(&path).map_err(|e| io_error(&path, e))?;
            files.insert(relative.clone(), ViewFile::decode(&relative, bytes)?);
        }
    }

    Ok(files)
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads a standalone configuration file, format chosen by extension.
fn read_conf_file(path: &Path) -> Result<Value, DomainError> {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let name = path.to_string_lossy();
    match ViewFile::decode(&name, bytes)? {
        ViewFile::Data(value) => Ok(value),
        _ => Err(DomainError::new(
            ErrorCode::InvalidView,
            format!("'{}' is not a JSON, YAML or TOML file", name),
        )),
    }
}
