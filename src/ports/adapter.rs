//! Adapter ports - the plugin contract every adapter implements.
//!
//! An adapter plugin is registered under a module key and contributes:
//!
//! 1. a subscription factory, telling the router which events it wants,
//! 2. an adapter factory, creating the long-lived [`Adapter`] resource,
//! 3. optionally a JSON schema for its own configuration section.
//!
//! An adapter in turn creates one [`AdapterSession`] per authenticated
//! client connection.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::event::{Event, Subscription};
use crate::domain::foundation::{DomainError, JsonStorage, Resource};

use super::EventBusClient;

/// Callback used by sessions to push notifications to their client.
///
/// Delivery is best effort; the callback never blocks and never fails.
pub type NotifyCallback = Arc<dyn Fn(&str, Value) + Send + Sync>;

/// Identity a session is created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOwner {
    pub user: String,
    pub roles: BTreeSet<String>,
}

/// Long-lived adapter resource, one per configured adapter.
///
/// # Contract
///
/// - `process_events` is never called concurrently with itself.
/// - Events arrive in bus order, already filtered by the adapter's
///   subscription.
/// - Returning an error from `process_events` closes the adapter.
/// - Sessions must be created as children of the adapter's group so they
///   close with it.
#[async_trait]
pub trait Adapter: Resource {
    /// Handles a batch of routed events.
    async fn process_events(&self, events: Vec<Event>) -> Result<(), DomainError>;

    /// Creates a session for an authenticated client.
    async fn create_session(
        &self,
        owner: SessionOwner,
        notify: NotifyCallback,
    ) -> Result<Arc<dyn AdapterSession>, DomainError>;
}

/// Per-client adapter context.
#[async_trait]
pub trait AdapterSession: Resource {
    /// Private state replicated to the client under the adapter's name.
    fn state(&self) -> &JsonStorage;

    /// Handles one client request.
    ///
    /// Errors are returned to the requesting client only and do not close
    /// the session.
    async fn process_request(&self, name: &str, data: Value) -> Result<Value, DomainError>;
}

/// Entry point of an adapter plugin.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    /// Schema for the adapter's configuration section, if it has one.
    fn json_schema(&self) -> Option<Value> {
        None
    }

    /// Builds the subscription for a configuration section.
    fn create_subscription(&self, conf: &Value) -> Result<Subscription, DomainError>;

    /// Creates the adapter.
    async fn create_adapter(
        &self,
        conf: &Value,
        client: Arc<dyn EventBusClient>,
    ) -> Result<Arc<dyn Adapter>, DomainError>;
}
