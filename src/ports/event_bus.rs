//! Event bus ports - connection to the upstream event bus and the cluster
//! monitor that decides which process talks to it.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::event::{Event, EventType};
use crate::domain::foundation::{DomainError, Resource};
use crate::domain::stack::BusStatus;

/// Parameters of a history query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// Patterns to filter by. `None` queries all types.
    pub event_types: Option<Vec<EventType>>,
    /// Return only the newest event of each concrete type.
    pub unique_type: bool,
    pub max_results: Option<usize>,
}

/// Connected event bus client.
///
/// Closing the client's group ends the connection; every stack running on
/// top of it must then be torn down.
#[async_trait]
pub trait EventBusClient: Resource {
    /// Waits for the next batch of events.
    ///
    /// Returns a connection-closed error once the client is closed.
    async fn receive(&self) -> Result<Vec<Event>, DomainError>;

    /// Queries stored events, newest first.
    async fn query(&self, params: QueryParams) -> Result<Vec<Event>, DomainError>;

    /// Every status change of the bus server, in order, starting with the
    /// current status. The stream ends when the connection closes.
    ///
    /// Changes are never coalesced, so a short outage is observed even when
    /// the bus recovers before the consumer gets to run.
    fn status_changes(&self) -> mpsc::UnboundedReceiver<BusStatus>;
}

/// Cluster membership client.
///
/// Every time this process is elected to serve, the monitor connects to the
/// event bus and yields the fresh client. The client is closed by the
/// monitor when leadership is lost.
#[async_trait]
pub trait ClusterMonitor: Resource {
    /// Announces whether this component is ready to be elected.
    fn set_ready(&self, ready: bool);

    /// Waits for the next election. Returns `None` once the monitor closes.
    async fn next_client(&self) -> Option<Arc<dyn EventBusClient>>;
}
