//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, error types and the two runtime
//! primitives every component is built on: resource groups (cancellation
//! scopes) and observable JSON storage.

mod errors;
mod ids;
mod resource;
mod state_machine;
mod storage;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ClientId, EventId};
pub use resource::{Resource, ResourceGroup};
pub use state_machine::StateMachine;
pub use storage::{ChangeCallback, ChangeHandle, JsonStorage};
pub use timestamp::Timestamp;
