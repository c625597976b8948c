//! Client transport port - the remote peer of one connection.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{DomainError, JsonStorage, Resource};

/// Bidirectional channel to one browser client.
///
/// Inbound requests are not part of this trait: the transport hands them to
/// the connection controller, which answers each with a result.
///
/// # Contract
///
/// - Changes of [`state`](ClientTransport::state) reach the peer eventually,
///   in order, without explicit calls.
/// - [`flush`](ClientTransport::flush) sends pending state changes now, so a
///   following notification never overtakes the state it refers to.
/// - Once the group closes, `notify` and `flush` fail with a
///   connection-closed error.
#[async_trait]
pub trait ClientTransport: Resource {
    /// Shared state replicated to the peer.
    fn state(&self) -> &JsonStorage;

    /// Pushes a notification.
    async fn notify(&self, name: &str, data: Value) -> Result<(), DomainError>;

    /// Propagates pending state changes immediately.
    async fn flush(&self) -> Result<(), DomainError>;
}
