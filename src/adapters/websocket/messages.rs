//! WebSocket message types.
//!
//! Defines the protocol between server and connected clients:
//! - Client → Server: requests
//! - Server → Client: responses, state patches, notifications

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::DomainError;

use super::patch::PatchOperation;

// ============================================
// Client → Server Messages
// ============================================

/// All message types that can be received from client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request answered by exactly one response with the same id.
    Request {
        id: u64,
        name: String,
        #[serde(default)]
        data: Value,
    },
}

// ============================================
// Server → Client Messages
// ============================================

/// All message types that can be sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Result of a request. On failure `data` holds the error text.
    Response { id: u64, success: bool, data: Value },

    /// Changes of the replicated state since the previous state message.
    State { diff: Vec<PatchOperation> },

    /// Push notification.
    Notify { name: String, data: Value },
}

impl ServerMessage {
    pub fn response(id: u64, result: Result<Value, DomainError>) -> Self {
        match result {
            Ok(data) => ServerMessage::Response {
                id,
                success: true,
                data,
            },
            Err(err) => ServerMessage::Response {
                id,
                success: false,
                data: Value::String(err.to_string()),
            },
        }
    }
}
