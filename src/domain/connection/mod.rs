//! Connection module - client connection lifecycle and request addressing.

mod request;
mod status;

pub use request::RequestTarget;
pub use status::ConnectionStatus;
