//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the application and the outside world. Adapters implement these ports.
//!
//! ## Plugin Ports
//!
//! - `AdapterFactory` - Entry point of an adapter plugin
//! - `Adapter` - Long-lived adapter resource receiving routed events
//! - `AdapterSession` - Per-client adapter context with private state
//!
//! ## Upstream Ports
//!
//! - `EventBusClient` - Connected event bus client
//! - `ClusterMonitor` - Cluster membership, yields a bus client per election
//!
//! ## Downstream Ports
//!
//! - `ClientTransport` - Remote browser peer of one connection
//! - `ViewProvider` - Materialised client views
//! - `SchemaValidator` - JSON Schema validation of configuration

mod adapter;
mod client_transport;
mod event_bus;
mod schema_validator;
mod view_provider;

pub use adapter::{Adapter, AdapterFactory, AdapterSession, NotifyCallback, SessionOwner};
pub use client_transport::ClientTransport;
pub use event_bus::{ClusterMonitor, EventBusClient, QueryParams};
pub use schema_validator::{SchemaValidationError, SchemaValidator};
pub use view_provider::ViewProvider;
