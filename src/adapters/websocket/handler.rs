//! WebSocket upgrade handler for client connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Create the transport and the connection controller
//! 2. Forward queued server messages to the socket
//! 3. Submit client requests, in arrival order, and send their responses
//! 4. Close the connection group on disconnect

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::{Client, ConnectionContext};
use crate::domain::foundation::{Resource, ResourceGroup};

use super::messages::{ClientMessage, ServerMessage};
use super::transport::WsTransport;

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub context: Arc<ConnectionContext>,
    /// Parent group of every connection
    pub group: ResourceGroup,
    pub autoflush_delay: Duration,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
///
/// Runs for the lifetime of the connection.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let group = state.group.child();
    let (sink, mut stream) = socket.split();

    let (transport, outbox) = WsTransport::new(group.clone(), state.autoflush_delay);
    group.spawn(write_messages(sink, outbox, group.clone()));

    let client = Client::spawn(transport.clone(), state.context.clone());
    let client_id = client.id();

    loop {
        let frame = tokio::select! {
            biased;
            _ = group.wait_closing() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Request { id, name, data }) => {
                    let pending = client.submit(name, data);
                    let transport = transport.clone();
                    group.spawn(async move {
                        let result = pending.wait().await;
                        let _ = transport.send(ServerMessage::response(id, result));
                    });
                }
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "Malformed client message, closing connection");
                    break;
                }
            },
            Some(Ok(Message::Binary(_))) => {
                warn!(client_id = %client_id, "Received unsupported binary message, closing connection");
                break;
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(client_id = %client_id, "Client closed connection");
                break;
            }
            // WebSocket protocol ping/pong - handled automatically by axum
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(client_id = %client_id, error = %e, "Receive error");
                break;
            }
        }
    }

    client.close();
    group.async_close().await;
}

/// Writes queued messages to the socket until it fails or the queue ends.
async fn write_messages(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
    group: ResourceGroup,
) {
    while let Some(message) = outbox.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to serialize server message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            debug!(error = %e, "Send error, closing connection");
            break;
        }
    }
    group.close();
}
