//! WebSocket client transport.
//!
//! Owns the replicated state of one connection and turns it into outgoing
//! messages. State changes are collected and pushed as one JSON Patch after
//! the autoflush delay; [`ClientTransport::flush`] pushes them immediately.
//! Messages are queued for the socket writer in the order they are produced.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::trace;

use crate::domain::foundation::{ChangeHandle, DomainError, JsonStorage, Resource, ResourceGroup};
use crate::ports::ClientTransport;

use super::messages::ServerMessage;
use super::patch::diff;

/// Transport side of one WebSocket connection.
pub struct WsTransport {
    group: ResourceGroup,
    state: JsonStorage,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    /// Last state value sent to the peer.
    synced: Mutex<Value>,
    _observer: ChangeHandle,
}

impl WsTransport {
    /// Creates the transport and the queue its messages are written from.
    ///
    /// The autoflush task runs in `group`.
    pub fn new(
        group: ResourceGroup,
        autoflush_delay: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbound, outbox) = mpsc::unbounded_channel();
        let state = JsonStorage::new();

        let dirty = Arc::new(Notify::new());
        let signal = dirty.clone();
        let observer = state.register_change_cb(move |_| signal.notify_one());

        let transport = Arc::new(Self {
            group: group.clone(),
            state,
            outbound,
            synced: Mutex::new(Value::Null),
            _observer: observer,
        });

        let weak = Arc::downgrade(&transport);
        group.spawn(async move {
            loop {
                dirty.notified().await;
                tokio::time::sleep(autoflush_delay).await;
                let Some(transport) = weak.upgrade() else {
                    return;
                };
                if transport.flush().await.is_err() {
                    return;
                }
            }
        });

        (transport, outbox)
    }

    /// Queues a message for the peer.
    pub fn send(&self, message: ServerMessage) -> Result<(), DomainError> {
        if self.group.is_closing() {
            return Err(DomainError::connection_closed());
        }
        self.outbound
            .send(message)
            .map_err(|_| DomainError::connection_closed())
    }
}

impl Resource for WsTransport {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl ClientTransport for WsTransport {
    fn state(&self) -> &JsonStorage {
        &self.state
    }

    async fn notify(&self, name: &str, data: Value) -> Result<(), DomainError> {
        self.flush().await?;
        self.send(ServerMessage::Notify {
            name: name.to_string(),
            data,
        })
    }

    async fn flush(&self) -> Result<(), DomainError> {
        let mut synced = self.synced.lock().await;
        let current = self.state.get();
        let ops = diff(&synced, &current);
        if ops.is_empty() {
            return Ok(());
        }

        trace!(operations = ops.len(), "Sending state patch");
        self.send(ServerMessage::State { diff: ops })?;
        *synced = current;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::patch::PatchOperation;
    use serde_json::json;

    #[tokio::test]
    async fn state_changes_are_flushed_after_delay() {
        let group = ResourceGroup::new();
        let (transport, mut outbox) = WsTransport::new(group.clone(), Duration::from_millis(10));

        transport.state().set(json!({"a": 1}));
        transport.state().set_path(&["b"], json!(2));

        let message = tokio::time::timeout(Duration::from_secs(1), outbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            ServerMessage::State {
                diff: vec![PatchOperation::Replace {
                    path: String::new(),
                    value: json!({"a": 1, "b": 2})
                }]
            }
        );
    }

    #[tokio::test]
    async fn notify_sends_pending_state_first() {
        let group = ResourceGroup::new();
        let (transport, mut outbox) = WsTransport::new(group.clone(), Duration::from_secs(3600));

        transport.state().set(json!({}));
        transport.notify("init", json!(null)).await.unwrap();

        assert!(matches!(outbox.recv().await, Some(ServerMessage::State { .. })));
        assert!(matches!(outbox.recv().await, Some(ServerMessage::Notify { name, .. }) if name == "init"));
    }

    #[tokio::test]
    async fn flush_without_changes_sends_nothing() {
        let group = ResourceGroup::new();
        let (transport, mut outbox) = WsTransport::new(group.clone(), Duration::from_secs(3600));

        transport.flush().await.unwrap();

        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_transport_rejects_messages() {
        let group = ResourceGroup::new();
        let (transport, _outbox) = WsTransport::new(group.clone(), Duration::from_millis(10));

        group.async_close().await;
        transport.state().set(json!({"a": 1}));

        assert!(transport.flush().await.unwrap_err().is_connection_closed());
        assert!(transport
            .notify("x", Value::Null)
            .await
            .unwrap_err()
            .is_connection_closed());
    }
}
