//! Client - connection controller for one browser client.
//!
//! The controller drives the connection through its lifecycle:
//!
//! ```text
//! Anonymous ── init(initial view) ──► Authenticating ── login ──► Active
//!     ▲                                                           │
//!     └──────────────────────── logout ───────────────────────────┘
//! ```
//!
//! Requests from the client are handled strictly in arrival order. Adapter
//! requests (`"<adapter>/<request>"`) are queued at the adapter's session
//! proxy and answered asynchronously, so a slow adapter only delays its own
//! requests. `login` and `logout` are handled by the controller itself.
//!
//! While active, the transport state holds one entry per adapter session,
//! mirrored from the session's private state. A session closed by its
//! adapter loses its entry; the other sessions continue.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::domain::connection::{ConnectionStatus, RequestTarget};
use crate::domain::foundation::{
    ChangeHandle, ClientId, DomainError, ErrorCode, Resource, ResourceGroup, StateMachine,
};
use crate::domain::user::{User, UserDirectory};
use crate::domain::view::View;
use crate::ports::{ClientTransport, NotifyCallback, SessionOwner, ViewProvider};

use super::{AdapterRegistry, PendingResponse, SessionProxy};

/// Everything a connection needs from its serving stack.
pub struct ConnectionContext {
    pub registry: Arc<AdapterRegistry>,
    pub users: Arc<UserDirectory>,
    pub views: Arc<dyn ViewProvider>,
    /// View shown before login
    pub initial_view: Option<String>,
}

type Responder = oneshot::Sender<Result<Value, DomainError>>;

struct PendingRequest {
    name: String,
    data: Value,
    responder: Responder,
}

/// Handle to a running connection controller.
///
/// The controller shares the transport's resource group: closing either
/// ends the connection.
pub struct Client {
    id: ClientId,
    group: ResourceGroup,
    requests: mpsc::UnboundedSender<PendingRequest>,
    status: watch::Receiver<ConnectionStatus>,
}

impl Client {
    /// Starts the controller for a freshly connected transport.
    pub fn spawn(transport: Arc<dyn ClientTransport>, context: Arc<ConnectionContext>) -> Self {
        let id = ClientId::new();
        let group = transport.group().clone();
        let (requests, queue) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::Anonymous);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (notifications, outbox) = mpsc::unbounded_channel();

        group.spawn(forward_notifications(id, transport.clone(), outbox));

        let controller = Controller {
            id,
            group: group.clone(),
            transport,
            context,
            queue,
            status: status_tx,
            notifications,
            closed_tx,
            closed_rx,
            generation: 0,
        };
        group.spawn_uncancellable(controller.run());

        debug!(client_id = %id, "Client connected");
        Self {
            id,
            group,
            requests,
            status,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver observing status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Queues one request from the remote peer without waiting.
    ///
    /// Requests are handled in submission order; the response resolves with
    /// a connection-closed error if the connection closes first.
    pub fn submit(&self, name: impl Into<String>, data: Value) -> PendingResponse {
        let (responder, receiver) = oneshot::channel();
        let request = PendingRequest {
            name: name.into(),
            data,
            responder,
        };
        match self.requests.send(request) {
            Ok(()) => PendingResponse::new(Some(receiver)),
            Err(_) => PendingResponse::new(None),
        }
    }

    /// Handles one request from the remote peer.
    pub async fn request(&self, name: impl Into<String>, data: Value) -> Result<Value, DomainError> {
        self.submit(name, data).wait().await
    }
}

impl Resource for Client {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

struct ActiveSession {
    proxy: Arc<SessionProxy>,
    state_observer: ChangeHandle,
}

enum ActiveInput {
    Request(PendingRequest),
    SessionClosed { adapter: String, generation: u64 },
}

struct Controller {
    id: ClientId,
    group: ResourceGroup,
    transport: Arc<dyn ClientTransport>,
    context: Arc<ConnectionContext>,
    queue: mpsc::UnboundedReceiver<PendingRequest>,
    status: watch::Sender<ConnectionStatus>,
    notifications: mpsc::UnboundedSender<(String, Value)>,
    closed_tx: mpsc::UnboundedSender<(String, u64)>,
    closed_rx: mpsc::UnboundedReceiver<(String, u64)>,
    /// Incremented per login so stale session-closed signals are ignored.
    generation: u64,
}

impl Controller {
    async fn run(mut self) {
        match self.run_lifecycle().await {
            Err(err) if !err.is_connection_closed() => {
                warn!(client_id = %self.id, error = %err, "Client connection failed");
            }
            _ => {}
        }

        self.set_status(ConnectionStatus::Closed);
        self.queue.close();
        while let Ok(request) = self.queue.try_recv() {
            let _ = request.responder.send(Err(DomainError::connection_closed()));
        }

        debug!(client_id = %self.id, "Client disconnected");
        self.group.close();
    }

    async fn run_lifecycle(&mut self) -> Result<(), DomainError> {
        let mut logout_ack: Option<Responder> = None;

        loop {
            self.set_status(ConnectionStatus::Anonymous);
            self.transport.state().set(json!({}));
            self.init_client(None).await?;
            if let Some(ack) = logout_ack.take() {
                let _ = ack.send(Ok(Value::Null));
            }
            self.set_status(ConnectionStatus::Authenticating);

            let (user, login_ack) = self.authenticate().await?;

            let mut sessions = match self.create_sessions(&user).await {
                Ok(sessions) => sessions,
                Err(err) => {
                    warn!(client_id = %self.id, user = %user.name, error = %err, "Session creation failed");
                    let _ = login_ack.send(Err(err));
                    continue;
                }
            };

            self.set_status(ConnectionStatus::Active);
            self.init_client(Some(&user)).await?;
            let _ = login_ack.send(Ok(Value::Null));
            debug!(client_id = %self.id, user = %user.name, "User logged in");

            let result = self.serve_active(&mut sessions).await;
            close_sessions(sessions).await;
            logout_ack = Some(result?);
            debug!(client_id = %self.id, user = %user.name, "User logged out");
        }
    }

    /// Replaces the client's view and sends the `init` notification.
    async fn init_client(&self, user: Option<&User>) -> Result<(), DomainError> {
        let view_name = match user {
            Some(user) => user.view.clone(),
            None => self.context.initial_view.clone(),
        };
        let view: Option<View> = match &view_name {
            Some(name) => Some(self.context.views.get(name).await?),
            None => None,
        };

        self.transport.flush().await?;
        self.transport
            .notify(
                "init",
                json!({
                    "user": user.map(|u| u.name.clone()),
                    "roles": user.map(|u| u.roles.iter().cloned().collect::<Vec<_>>()).unwrap_or_default(),
                    "view": view.as_ref().map(View::data_json),
                    "conf": view.map(|v| v.conf),
                }),
            )
            .await
    }

    /// Answers requests until a login succeeds.
    async fn authenticate(&mut self) -> Result<(User, Responder), DomainError> {
        loop {
            let request = self.next_request().await?;
            let result = match RequestTarget::parse(&request.name) {
                RequestTarget::Login => match self.login(&request.data) {
                    Ok(user) => return Ok((user, request.responder)),
                    Err(err) => {
                        debug!(client_id = %self.id, error = %err, "Login rejected");
                        Err(err)
                    }
                },
                RequestTarget::Logout => Ok(Value::Null),
                RequestTarget::Adapter { adapter, .. } => Err(unsupported_adapter(&adapter)),
                RequestTarget::Unsupported(name) => Err(unsupported_request(&name)),
            };
            let _ = request.responder.send(result);
        }
    }

    fn login(&self, data: &Value) -> Result<User, DomainError> {
        let name = data.get("name").and_then(Value::as_str);
        let password = data.get("password").and_then(Value::as_str);
        let (Some(name), Some(password)) = (name, password) else {
            return Err(DomainError::new(
                ErrorCode::InvalidFormat,
                "login requires 'name' and 'password'",
            ));
        };
        Ok(self.context.users.authenticate(name, password)?)
    }

    async fn create_sessions(
        &mut self,
        user: &User,
    ) -> Result<HashMap<String, ActiveSession>, DomainError> {
        self.generation += 1;
        let owner = SessionOwner {
            user: user.name.clone(),
            roles: user.roles.clone(),
        };

        let mut sessions = HashMap::new();
        for (name, adapter) in self.context.registry.live_adapters() {
            let notify = self.notify_callback(&name);
            let proxy = match SessionProxy::create(
                name.as_str(),
                &adapter,
                owner.clone(),
                notify,
                &self.group,
            )
            .await
            {
                Ok(proxy) => Arc::new(proxy),
                Err(err) => {
                    close_sessions(sessions).await;
                    return Err(err.with_detail("adapter", name));
                }
            };

            let state = self.transport.state().clone();
            let key = name.clone();
            let state_observer = proxy
                .state()
                .register_change_cb(move |value| state.set_path(&[key.as_str()], value.clone()));

            let closed_tx = self.closed_tx.clone();
            let generation = self.generation;
            let watched = proxy.group().clone();
            let adapter_name = name.clone();
            self.group.spawn(async move {
                watched.wait_closing().await;
                let _ = closed_tx.send((adapter_name, generation));
            });

            sessions.insert(
                name,
                ActiveSession {
                    proxy,
                    state_observer,
                },
            );
        }

        Ok(sessions)
    }

    /// Serves an authenticated user until logout. Returns the logout
    /// request's responder.
    async fn serve_active(
        &mut self,
        sessions: &mut HashMap<String, ActiveSession>,
    ) -> Result<Responder, DomainError> {
        loop {
            let input = tokio::select! {
                biased;
                _ = self.group.wait_closing() => return Err(DomainError::connection_closed()),
                Some((adapter, generation)) = self.closed_rx.recv() => {
                    ActiveInput::SessionClosed { adapter, generation }
                }
                request = self.queue.recv() => {
                    ActiveInput::Request(request.ok_or_else(DomainError::connection_closed)?)
                }
            };

            let request = match input {
                ActiveInput::SessionClosed {
                    adapter,
                    generation,
                } => {
                    if generation == self.generation {
                        self.remove_session(sessions, &adapter);
                    }
                    continue;
                }
                ActiveInput::Request(request) => request,
            };

            match RequestTarget::parse(&request.name) {
                RequestTarget::Adapter { adapter, request: name } => {
                    match sessions.get(&adapter).filter(|s| s.proxy.is_open()) {
                        Some(session) => {
                            trace!(client_id = %self.id, adapter = %adapter, request = %name, "Dispatching request");
                            let pending = session.proxy.submit(name, request.data);
                            let responder = request.responder;
                            self.group.spawn_uncancellable(async move {
                                let _ = responder.send(pending.wait().await);
                            });
                        }
                        None => {
                            let _ = request.responder.send(Err(unsupported_adapter(&adapter)));
                        }
                    }
                }
                RequestTarget::Logout => return Ok(request.responder),
                RequestTarget::Login => {
                    let _ = request.responder.send(Err(DomainError::new(
                        ErrorCode::AlreadyAuthenticated,
                        "already logged in",
                    )));
                }
                RequestTarget::Unsupported(name) => {
                    let _ = request.responder.send(Err(unsupported_request(&name)));
                }
            }
        }
    }

    fn remove_session(&self, sessions: &mut HashMap<String, ActiveSession>, adapter: &str) {
        if let Some(session) = sessions.remove(adapter) {
            drop(session.state_observer);
            self.transport.state().remove_path(&[adapter]);
            debug!(client_id = %self.id, adapter = %adapter, "Session closed by adapter");
        }
    }

    async fn next_request(&mut self) -> Result<PendingRequest, DomainError> {
        tokio::select! {
            biased;
            _ = self.group.wait_closing() => Err(DomainError::connection_closed()),
            request = self.queue.recv() => request.ok_or_else(DomainError::connection_closed),
        }
    }

    fn notify_callback(&self, adapter: &str) -> NotifyCallback {
        let notifications = self.notifications.clone();
        let adapter = adapter.to_string();
        Arc::new(move |name: &str, data: Value| {
            let _ = notifications.send((format!("{}/{}", adapter, name), data));
        })
    }

    fn set_status(&self, next: ConnectionStatus) {
        let current = *self.status.borrow();
        if current == next {
            return;
        }
        match current.transition_to(next) {
            Ok(next) => {
                self.status.send_replace(next);
                trace!(client_id = %self.id, from = %current, to = %next, "Connection status changed");
            }
            Err(err) => {
                warn!(client_id = %self.id, error = %err, "Rejected connection status change");
            }
        }
    }
}

async fn close_sessions(sessions: HashMap<String, ActiveSession>) {
    join_all(sessions.into_values().map(|session| async move {
        drop(session.state_observer);
        session.proxy.group().async_close().await;
    }))
    .await;
}

// Notifications are best effort: anything the transport refuses is dropped.
async fn forward_notifications(
    id: ClientId,
    transport: Arc<dyn ClientTransport>,
    mut outbox: mpsc::UnboundedReceiver<(String, Value)>,
) {
    while let Some((name, data)) = outbox.recv().await {
        if let Err(err) = transport.notify(&name, data).await {
            debug!(client_id = %id, notification = %name, error = %err, "Notification dropped");
        }
    }
}

fn unsupported_adapter(adapter: &str) -> DomainError {
    DomainError::new(
        ErrorCode::UnsupportedAdapter,
        format!("unsupported adapter '{}'", adapter),
    )
}

fn unsupported_request(name: &str) -> DomainError {
    DomainError::new(
        ErrorCode::UnsupportedRequest,
        format!("unsupported request '{}'", name),
    )
}
