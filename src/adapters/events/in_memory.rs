//! In-memory event bus.
//!
//! Provides an in-process stand-in for the upstream event bus: events are
//! registered locally, kept in a bounded history for queries and delivered
//! to every connected client whose subscription matches. Once the history
//! is full the oldest events are evicted. The bus status can be set
//! explicitly to exercise the supervisor.
//!
//! Used by the integration tests and by the standalone binary mode.
//!
//! # Example
//!
//! ```ignore
//! let bus = InMemoryEventBus::new();
//! let client = bus.client();
//!
//! bus.register(EventType::from(["a", "b"]), None);
//! let batch = client.receive().await?;
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::event::{Event, EventPayload, EventType, Subscription};
use crate::domain::foundation::{DomainError, EventId, Resource, ResourceGroup};
use crate::domain::stack::BusStatus;
use crate::ports::{EventBusClient, QueryParams};

struct ClientEntry {
    id: u64,
    group: ResourceGroup,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedSender<Vec<Event>>,
    status: Vec<mpsc::UnboundedSender<BusStatus>>,
}

/// Number of events kept for queries unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

struct BusState {
    next_instance: u64,
    next_client: u64,
    status: BusStatus,
    history: VecDeque<Event>,
    history_limit: usize,
    clients: Vec<ClientEntry>,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            next_instance: 0,
            next_client: 0,
            status: BusStatus::default(),
            history: VecDeque::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            clients: Vec::new(),
        }
    }
}

/// In-process event bus.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Creates an empty bus in `Standby` status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty bus keeping at most `limit` events for queries.
    pub fn with_history_limit(limit: usize) -> Self {
        let bus = Self::default();
        bus.lock().history_limit = limit;
        bus
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        lock_state(&self.state)
    }

    /// Connects a client receiving every event.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn client(&self) -> Arc<InMemoryEventBusClient> {
        self.connect(None)
    }

    /// Connects a client receiving only events matching `subscription`.
    pub fn subscribed_client(&self, subscription: Subscription) -> Arc<InMemoryEventBusClient> {
        self.connect(Some(subscription))
    }

    fn connect(&self, subscription: Option<Subscription>) -> Arc<InMemoryEventBusClient> {
        let group = ResourceGroup::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut state = self.lock();
        let id = state.next_client;
        state.next_client += 1;
        state.clients.push(ClientEntry {
            id,
            group: group.clone(),
            subscription,
            events: events_tx,
            status: Vec::new(),
        });
        drop(state);

        // Detaching drops the entry's senders, ending `receive` and the
        // status streams of the client.
        let bus = self.state.clone();
        let watched = group.clone();
        group.spawn_uncancellable(async move {
            watched.wait_closing().await;
            lock_state(&bus).clients.retain(|entry| entry.id != id);
            trace!(client = id, "Event bus client detached");
        });

        Arc::new(InMemoryEventBusClient {
            id,
            group,
            state: self.state.clone(),
            events: tokio::sync::Mutex::new(events_rx),
        })
    }

    /// Creates, stores and delivers one event.
    pub fn register(&self, event_type: EventType, payload: Option<EventPayload>) -> Event {
        let event = {
            let mut state = self.lock();
            let instance = state.next_instance;
            state.next_instance += 1;
            let event = Event::new(EventId::new(0, 0, instance), event_type);
            match payload {
                Some(payload) => event.with_payload(payload),
                None => event,
            }
        };
        self.publish(vec![event.clone()]);
        event
    }

    /// Stores a batch and delivers it to every connected client.
    ///
    /// Each client receives the matching part of the batch, in order, as one
    /// batch. Clients with no matching events receive nothing.
    pub fn publish(&self, events: Vec<Event>) {
        let mut state = self.lock();
        for entry in &state.clients {
            let batch: Vec<Event> = events
                .iter()
                .filter(|event| match &entry.subscription {
                    Some(subscription) => subscription.matches(&event.event_type),
                    None => true,
                })
                .cloned()
                .collect();
            if !batch.is_empty() {
                let _ = entry.events.send(batch);
            }
        }
        state.history.extend(events);
        let excess = state.history.len().saturating_sub(state.history_limit);
        state.history.drain(..excess);
    }

    /// Sets the status reported to every connected client.
    pub fn set_status(&self, status: BusStatus) {
        let mut state = self.lock();
        state.status = status;
        for entry in &mut state.clients {
            entry.status.retain(|tx| tx.send(status).is_ok());
        }
    }

    pub fn status(&self) -> BusStatus {
        self.lock().status
    }

    /// Closes every connected client.
    pub fn disconnect_all(&self) {
        let groups: Vec<ResourceGroup> = self
            .lock()
            .clients
            .iter()
            .map(|entry| entry.group.clone())
            .collect();
        for group in groups {
            group.close();
        }
    }

    /// Number of clients currently connected.
    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Every stored event, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.lock().history.iter().cloned().collect()
    }
}

fn lock_state(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client connected to an [`InMemoryEventBus`].
pub struct InMemoryEventBusClient {
    id: u64,
    group: ResourceGroup,
    state: Arc<Mutex<BusState>>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<Event>>>,
}

impl Resource for InMemoryEventBusClient {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl EventBusClient for InMemoryEventBusClient {
    async fn receive(&self) -> Result<Vec<Event>, DomainError> {
        let mut events = self.events.lock().await;
        tokio::select! {
            biased;
            _ = self.group.wait_closing() => Err(DomainError::connection_closed()),
            batch = events.recv() => batch.ok_or_else(DomainError::connection_closed),
        }
    }

    async fn query(&self, params: QueryParams) -> Result<Vec<Event>, DomainError> {
        if !self.is_open() {
            return Err(DomainError::connection_closed());
        }

        let filter = match params.event_types {
            Some(types) => Some(Subscription::new(types)?),
            None => None,
        };

        let state = lock_state(&self.state);
        let mut seen = HashSet::new();
        let events = state
            .history
            .iter()
            .rev()
            .filter(|event| match &filter {
                Some(filter) => filter.matches(&event.event_type),
                None => true,
            })
            .filter(|event| !params.unique_type || seen.insert(event.event_type.clone()))
            .take(params.max_results.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(events)
    }

    fn status_changes(&self) -> mpsc::UnboundedReceiver<BusStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock_state(&self.state);
        let current = state.status;
        // A detached client has no entry: the sender drops and the stream ends.
        if let Some(entry) = state.clients.iter_mut().find(|entry| entry.id == self.id) {
            if tx.send(current).is_ok() {
                entry.status.push(tx);
            }
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn event_type(segments: &[&str]) -> EventType {
        EventType::new(segments.iter().copied())
    }

    #[tokio::test]
    async fn registered_event_is_received_and_stored() {
        let bus = InMemoryEventBus::new();
        let client = bus.client();

        let event = bus.register(event_type(&["a", "b"]), Some(EventPayload::Json(json!(1))));

        assert_eq!(client.receive().await.unwrap(), vec![event.clone()]);
        assert_eq!(bus.history(), vec![event]);
    }

    #[tokio::test]
    async fn subscribed_client_receives_matching_part_of_batch() {
        let bus = InMemoryEventBus::new();
        let client = bus.subscribed_client(Subscription::new([event_type(&["x", "*"])]).unwrap());

        let events = vec![
            Event::new(EventId::new(0, 0, 0), event_type(&["x", "1"])),
            Event::new(EventId::new(0, 0, 1), event_type(&["y"])),
            Event::new(EventId::new(0, 0, 2), event_type(&["x", "2"])),
        ];
        bus.publish(events.clone());

        let batch = client.receive().await.unwrap();
        assert_eq!(batch, vec![events[0].clone(), events[2].clone()]);
    }

    #[tokio::test]
    async fn query_returns_newest_first_and_unique_per_type() {
        let bus = InMemoryEventBus::new();
        let client = bus.client();
        bus.register(event_type(&["a"]), Some(EventPayload::Json(json!(1))));
        bus.register(event_type(&["b"]), None);
        let newest_a = bus.register(event_type(&["a"]), Some(EventPayload::Json(json!(2))));

        let all = client.query(QueryParams::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], newest_a);

        let latest_a = client
            .query(QueryParams {
                event_types: Some(vec![event_type(&["a"])]),
                unique_type: true,
                max_results: None,
            })
            .await
            .unwrap();
        assert_eq!(latest_a, vec![newest_a]);
    }

    #[tokio::test]
    async fn history_evicts_oldest_events_beyond_limit() {
        let bus = InMemoryEventBus::with_history_limit(2);
        let client = bus.client();
        bus.register(event_type(&["a"]), None);
        let second = bus.register(event_type(&["b"]), None);
        let third = bus.register(event_type(&["c"]), None);

        assert_eq!(bus.history(), vec![second.clone(), third.clone()]);
        let queried = client.query(QueryParams::default()).await.unwrap();
        assert_eq!(queried, vec![third, second]);
    }

    #[tokio::test]
    async fn closing_client_ends_receive_and_status() {
        let bus = InMemoryEventBus::new();
        let client = bus.client();
        let mut status = client.status_changes();
        assert_eq!(status.recv().await, Some(BusStatus::Standby));

        client.group().async_close().await;

        assert!(client.receive().await.unwrap_err().is_connection_closed());
        assert_eq!(status.recv().await, None);
        assert_eq!(bus.client_count(), 0);
        assert_eq!(client.status_changes().recv().await, None);
    }

    #[tokio::test]
    async fn status_changes_reach_clients() {
        let bus = InMemoryEventBus::new();
        let client = bus.client();
        let mut status = client.status_changes();

        bus.set_status(BusStatus::Operational);

        assert_eq!(status.recv().await, Some(BusStatus::Standby));
        let next = tokio::time::timeout(Duration::from_secs(1), status.recv())
            .await
            .unwrap();
        assert_eq!(next, Some(BusStatus::Operational));
    }

    #[tokio::test]
    async fn quick_status_flaps_are_all_delivered() {
        let bus = InMemoryEventBus::new();
        bus.set_status(BusStatus::Operational);
        let client = bus.client();
        let mut status = client.status_changes();

        bus.set_status(BusStatus::Standby);
        bus.set_status(BusStatus::Operational);

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(status.recv().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![BusStatus::Operational, BusStatus::Standby, BusStatus::Operational]
        );
    }

    #[tokio::test]
    async fn disconnect_all_closes_clients() {
        let bus = InMemoryEventBus::new();
        let first = bus.client();
        let second = bus.client();

        bus.disconnect_all();

        assert!(!first.is_open());
        assert!(!second.is_open());
    }
}
