use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Map, Value};
use tracing::trace;

use crate::domain::event::{Event, EventPayload, EventType};
use crate::domain::foundation::{DomainError, ErrorCode, JsonStorage, Resource, ResourceGroup};
use crate::ports::{Adapter, AdapterSession, EventBusClient, NotifyCallback, QueryParams, SessionOwner};

use super::LatestConfig;

/// Newest event per configured event type.
pub struct LatestAdapter {
    group: ResourceGroup,
    authorized_roles: BTreeSet<String>,
    keys: HashMap<EventType, Vec<String>>,
    state: JsonStorage,
}

impl LatestAdapter {
    /// Creates the adapter, seeded with the newest stored event of every
    /// configured type.
    pub async fn create(conf: LatestConfig, client: &dyn EventBusClient) -> Result<Self, DomainError> {
        let mut keys: HashMap<EventType, Vec<String>> = HashMap::new();
        for item in conf.items {
            keys.entry(EventType::new(item.event_type))
                .or_default()
                .push(item.key);
        }

        let events = if keys.is_empty() {
            Vec::new()
        } else {
            client
                .query(QueryParams {
                    event_types: Some(keys.keys().cloned().collect()),
                    unique_type: true,
                    max_results: None,
                })
                .await?
        };

        let adapter = Self {
            group: ResourceGroup::new(),
            authorized_roles: conf.authorized_roles.into_iter().collect(),
            keys,
            state: JsonStorage::with_value(json!({})),
        };

        // Query results are newest first.
        let initial = adapter.events_to_data(events.iter().rev());
        adapter.state.set(Value::Object(initial));
        Ok(adapter)
    }

    /// Current state shared by authorized sessions.
    pub fn state(&self) -> &JsonStorage {
        &self.state
    }

    fn events_to_data<'a, I>(&self, events: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut data = Map::new();
        for event in events {
            if let Some(keys) = self.keys.get(&event.event_type) {
                for key in keys {
                    data.insert(key.clone(), event_to_json(event));
                }
            }
        }
        data
    }
}

impl Resource for LatestAdapter {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl Adapter for LatestAdapter {
    async fn process_events(&self, events: Vec<Event>) -> Result<(), DomainError> {
        let data = self.events_to_data(&events);
        if data.is_empty() {
            return Ok(());
        }

        trace!(keys = data.len(), "Updating latest events");
        let mut state = match self.state.get() {
            Value::Object(state) => state,
            _ => Map::new(),
        };
        state.extend(data);
        self.state.set(Value::Object(state));
        Ok(())
    }

    async fn create_session(
        &self,
        owner: SessionOwner,
        _notify: NotifyCallback,
    ) -> Result<Arc<dyn AdapterSession>, DomainError> {
        let group = self.group.child();
        let state = JsonStorage::with_value(json!({}));

        if !owner.roles.is_disjoint(&self.authorized_roles) {
            let target = state.clone();
            let handle = self
                .state
                .register_change_cb(move |value| target.set(value.clone()));
            let watched = group.clone();
            group.spawn_uncancellable(async move {
                watched.wait_closing().await;
                drop(handle);
            });
        }

        Ok(Arc::new(LatestSession { group, state }))
    }
}

/// Session of a latest adapter. Read only: every request is rejected.
pub struct LatestSession {
    group: ResourceGroup,
    state: JsonStorage,
}

impl Resource for LatestSession {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl AdapterSession for LatestSession {
    fn state(&self) -> &JsonStorage {
        &self.state
    }

    async fn process_request(&self, name: &str, _data: Value) -> Result<Value, DomainError> {
        Err(DomainError::new(
            ErrorCode::UnsupportedRequest,
            format!("request '{}' not supported", name),
        ))
    }
}

fn event_to_json(event: &Event) -> Value {
    json!({
        "timestamp": event.timestamp.as_unix_secs_f64(),
        "source_timestamp": event.source_timestamp.map(|t| t.as_unix_secs_f64()),
        "payload": event.payload.as_ref().map(payload_to_json),
    })
}

fn payload_to_json(payload: &EventPayload) -> Value {
    match payload {
        EventPayload::Json(data) => json!({"type": "JSON", "data": data}),
        EventPayload::Binary { data_type, data } => json!({
            "type": "BINARY",
            "data_type": data_type,
            "data": base64::engine::general_purpose::STANDARD.encode(data),
        }),
    }
}
