//! WebSocket adapters for browser clients.
//!
//! ```text
//! browser ──ws──► handler ──submit──► Client (connection controller)
//!    ▲                                   │ state / notify
//!    └──── writer ◄── WsTransport ◄──────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types
//! - [`patch`] - JSON Patch generation for state messages
//! - [`transport`] - `ClientTransport` implementation with autoflush
//! - [`handler`] - Axum WebSocket upgrade handler
//! - [`server`] - HTTP server implementing `ClientServer`

pub mod handler;
pub mod messages;
pub mod patch;
pub mod server;
pub mod transport;

pub use handler::{ws_handler, WebSocketState};
pub use messages::{ClientMessage, ServerMessage};
pub use patch::{diff, PatchOperation};
pub use server::WsServer;
pub use transport::WsTransport;
