//! SessionProxy - serialized access to one adapter session.
//!
//! Requests are queued in a FIFO and handed to the session one at a time.
//! Every submitted request is answered exactly once: with the session's
//! result, or with a connection-closed error once the proxy closes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::domain::foundation::{DomainError, JsonStorage, Resource, ResourceGroup};
use crate::ports::{Adapter, AdapterSession, NotifyCallback, SessionOwner};

type Responder = oneshot::Sender<Result<Value, DomainError>>;

struct PendingRequest {
    name: String,
    data: Value,
    responder: Responder,
}

/// Answer to a submitted request. Resolves with a connection-closed error
/// if the request is dropped unanswered.
pub struct PendingResponse {
    receiver: Option<oneshot::Receiver<Result<Value, DomainError>>>,
}

impl PendingResponse {
    pub(super) fn new(receiver: Option<oneshot::Receiver<Result<Value, DomainError>>>) -> Self {
        Self { receiver }
    }

    /// Waits for the answer.
    pub async fn wait(self) -> Result<Value, DomainError> {
        match self.receiver {
            Some(receiver) => receiver
                .await
                .unwrap_or_else(|_| Err(DomainError::connection_closed())),
            None => Err(DomainError::connection_closed()),
        }
    }
}

/// One client's session with one adapter.
///
/// The proxy and the session close together: closing either one closes
/// the other.
pub struct SessionProxy {
    adapter_name: String,
    session: Arc<dyn AdapterSession>,
    group: ResourceGroup,
    requests: mpsc::UnboundedSender<PendingRequest>,
}

impl SessionProxy {
    /// Creates a session on `adapter` and starts its request queue.
    ///
    /// The proxy's group is a child of `parent`.
    pub async fn create(
        adapter_name: impl Into<String>,
        adapter: &Arc<dyn Adapter>,
        owner: SessionOwner,
        notify: NotifyCallback,
        parent: &ResourceGroup,
    ) -> Result<Self, DomainError> {
        let adapter_name = adapter_name.into();
        let session = adapter.create_session(owner, notify).await?;

        let group = parent.child();
        group.bind(session.group());

        let (requests, queue) = mpsc::unbounded_channel();
        group.spawn_uncancellable(request_loop(
            adapter_name.clone(),
            group.clone(),
            session.clone(),
            queue,
        ));

        debug!(adapter = %adapter_name, "Session created");
        Ok(Self {
            adapter_name,
            session,
            group,
            requests,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// The session's private state.
    pub fn state(&self) -> &JsonStorage {
        self.session.state()
    }

    /// Queues a request without waiting for its answer.
    ///
    /// Requests are processed in submission order.
    pub fn submit(&self, name: impl Into<String>, data: Value) -> PendingResponse {
        if self.group.is_closing() {
            return PendingResponse { receiver: None };
        }

        let (responder, receiver) = oneshot::channel();
        let request = PendingRequest {
            name: name.into(),
            data,
            responder,
        };

        match self.requests.send(request) {
            Ok(()) => PendingResponse {
                receiver: Some(receiver),
            },
            Err(_) => PendingResponse { receiver: None },
        }
    }

    /// Queues a request and waits for its answer.
    pub async fn process_request(
        &self,
        name: impl Into<String>,
        data: Value,
    ) -> Result<Value, DomainError> {
        self.submit(name, data).wait().await
    }
}

impl Resource for SessionProxy {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

async fn request_loop(
    adapter_name: String,
    group: ResourceGroup,
    session: Arc<dyn AdapterSession>,
    mut queue: mpsc::UnboundedReceiver<PendingRequest>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = group.wait_closing() => break,
            request = queue.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let PendingRequest {
            name,
            data,
            responder,
        } = request;

        trace!(adapter = %adapter_name, request = %name, "Processing session request");
        let result = tokio::select! {
            _ = group.wait_closing() => Err(DomainError::connection_closed()),
            result = session.process_request(&name, data) => result,
        };
        let _ = responder.send(result);
    }

    queue.close();
    while let Ok(request) = queue.try_recv() {
        let _ = request.responder.send(Err(DomainError::connection_closed()));
    }

    debug!(adapter = %adapter_name, "Session closed");
    group.close();
}
