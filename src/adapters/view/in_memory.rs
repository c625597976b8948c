//! In-memory view provider for tests.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::view::View;
use crate::ports::ViewProvider;

/// Serves a fixed set of views.
#[derive(Debug, Clone, Default)]
pub struct InMemoryViewProvider {
    views: HashMap<String, View>,
}

impl InMemoryViewProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a view, replacing any view with the same name.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.insert(view.name.clone(), view);
        self
    }
}

#[async_trait]
impl ViewProvider for InMemoryViewProvider {
    async fn get(&self, name: &str) -> Result<View, DomainError> {
        self.views.get(name).cloned().ok_or_else(|| {
            DomainError::new(ErrorCode::ViewNotFound, format!("view '{}' not found", name))
        })
    }
}
