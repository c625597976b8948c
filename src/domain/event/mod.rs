//! Event module - events from the bus and subscriptions over their types.

#[allow(clippy::module_inception)]
mod event;
mod subscription;

pub use event::{Event, EventPayload, EventType};
pub use subscription::Subscription;
