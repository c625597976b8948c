//! View provider port.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::view::View;

/// Resolves view names to materialised views.
///
/// Implementations must be idempotent: asking twice for the same name with
/// unchanged sources yields equal views.
#[async_trait]
pub trait ViewProvider: Send + Sync {
    /// Returns the named view, validated against its bundled schema.
    async fn get(&self, name: &str) -> Result<View, DomainError>;
}
