//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the application to the outside world:
//! - `events` - In-memory event bus
//! - `latest` - Built-in adapter plugin keeping the newest event per type
//! - `validation` - JSON Schema validation of configuration
//! - `view` - View providers (filesystem, in-memory)
//! - `websocket` - Browser client transport and HTTP server

pub mod events;
pub mod latest;
pub mod validation;
pub mod view;
pub mod websocket;

pub use events::{InMemoryEventBus, InMemoryEventBusClient};
pub use latest::LatestAdapterFactory;
pub use validation::JsonSchemaValidator;
pub use view::{InMemoryViewProvider, ViewDirectory};
pub use websocket::{WsServer, WsTransport};
