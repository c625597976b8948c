//! Event bus adapters.
//!
//! - `InMemoryEventBus` - in-process bus for tests and standalone mode

mod in_memory;

pub use in_memory::{InMemoryEventBus, InMemoryEventBusClient};
