//! Shared test infrastructure for the integration tests.
//!
//! Provides a recording client transport, a configurable adapter plugin
//! and helpers to assemble connection and stack contexts.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use opview::adapters::InMemoryViewProvider;
use opview::application::{
    AdapterRegistry, ClientServer, ConnectionContext, PluginRegistry, StackContext,
};
use opview::config::AdapterConfig;
use opview::domain::event::{Event, EventType, Subscription};
use opview::domain::foundation::{DomainError, JsonStorage, Resource, ResourceGroup};
use opview::domain::user::{PasswordRecord, User, UserDirectory, UserEntry};
use opview::domain::view::{View, ViewFile};
use opview::ports::{
    Adapter, AdapterFactory, AdapterSession, ClientTransport, EventBusClient, NotifyCallback,
    SessionOwner,
};

// =============================================================================
// Polling
// =============================================================================

/// Polls `condition` until it holds, failing the test after one second.
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Transport
// =============================================================================

/// Client transport recording everything it would send.
pub struct RecordingTransport {
    group: ResourceGroup,
    state: JsonStorage,
    notifications: Mutex<Vec<(String, Value)>>,
    flushes: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            group: ResourceGroup::new(),
            state: JsonStorage::new(),
            notifications: Mutex::new(Vec::new()),
            flushes: Mutex::new(0),
        })
    }

    pub fn notifications(&self) -> Vec<(String, Value)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn notifications_named(&self, name: &str) -> Vec<Value> {
        self.notifications()
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, data)| data)
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock().unwrap()
    }
}

impl Resource for RecordingTransport {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl ClientTransport for RecordingTransport {
    fn state(&self) -> &JsonStorage {
        &self.state
    }

    async fn notify(&self, name: &str, data: Value) -> Result<(), DomainError> {
        if self.group.is_closing() {
            return Err(DomainError::connection_closed());
        }
        self.notifications
            .lock()
            .unwrap()
            .push((name.to_string(), data));
        Ok(())
    }

    async fn flush(&self) -> Result<(), DomainError> {
        if self.group.is_closing() {
            return Err(DomainError::connection_closed());
        }
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

// =============================================================================
// Adapter plugin
// =============================================================================

/// Observations shared by every adapter created through a [`MockPlugin`].
#[derive(Default)]
pub struct Recorder {
    events: Mutex<HashMap<String, Vec<Event>>>,
    batches: Mutex<HashMap<String, usize>>,
    adapters: Mutex<HashMap<String, ResourceGroup>>,
    created: Mutex<usize>,
    sessions: Mutex<Vec<(String, String, ResourceGroup)>>,
    requests: Mutex<Vec<(String, String)>>,
    /// Released once per `block` request.
    pub gate: Notify,
}

impl Recorder {
    /// Event types received by `adapter`, as dotted strings, in order.
    pub fn event_types(&self, adapter: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .get(adapter)
            .map(|events| {
                events
                    .iter()
                    .map(|event| event.event_type.segments().join("."))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of `process_events` calls `adapter` received.
    pub fn batch_count(&self, adapter: &str) -> usize {
        self.batches
            .lock()
            .unwrap()
            .get(adapter)
            .copied()
            .unwrap_or(0)
    }

    pub fn adapter_group(&self, adapter: &str) -> Option<ResourceGroup> {
        self.adapters.lock().unwrap().get(adapter).cloned()
    }

    /// Number of adapters created so far, across stack incarnations.
    pub fn adapters_created(&self) -> usize {
        *self.created.lock().unwrap()
    }

    /// Group of the newest session of `user` at `adapter`.
    pub fn session_group(&self, adapter: &str, user: &str) -> Option<ResourceGroup> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(a, u, _)| a == adapter && u == user)
            .map(|(_, _, group)| group.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// `(adapter, request)` pairs in processing order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

/// Adapter plugin driven by its configuration section.
///
/// - `event_types` - list of patterns, each a list of segments
/// - `fail_on` - first segment of event types that make `process_events` fail
/// - `fail_create` - refuse to create the adapter
/// - `fail_session` - refuse to create sessions
pub struct MockPlugin {
    pub recorder: Arc<Recorder>,
}

impl MockPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            recorder: Arc::new(Recorder::default()),
        })
    }

    /// Built-in plugins plus this one under the `mock` key.
    pub fn registry(self: &Arc<Self>) -> PluginRegistry {
        let mut plugins = PluginRegistry::builtin();
        plugins.register("mock", self.clone());
        plugins
    }
}

#[async_trait]
impl AdapterFactory for MockPlugin {
    fn create_subscription(&self, conf: &Value) -> Result<Subscription, DomainError> {
        let patterns: Vec<Vec<String>> = conf
            .get("event_types")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DomainError::configuration(e.to_string()))?
            .unwrap_or_default();
        Ok(Subscription::new(patterns.into_iter().map(EventType::new))?)
    }

    async fn create_adapter(
        &self,
        conf: &Value,
        _client: Arc<dyn EventBusClient>,
    ) -> Result<Arc<dyn Adapter>, DomainError> {
        if conf.get("fail_create").and_then(Value::as_bool) == Some(true) {
            return Err(DomainError::adapter("creation refused"));
        }
        let name = conf
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let group = ResourceGroup::new();
        *self.recorder.created.lock().unwrap() += 1;
        self.recorder
            .adapters
            .lock()
            .unwrap()
            .insert(name.clone(), group.clone());

        Ok(Arc::new(MockAdapter {
            name,
            group,
            fail_on: conf
                .get("fail_on")
                .and_then(Value::as_str)
                .map(str::to_string),
            fail_session: conf.get("fail_session").and_then(Value::as_bool) == Some(true),
            recorder: self.recorder.clone(),
        }))
    }
}

pub struct MockAdapter {
    name: String,
    group: ResourceGroup,
    fail_on: Option<String>,
    fail_session: bool,
    recorder: Arc<Recorder>,
}

impl Resource for MockAdapter {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn process_events(&self, events: Vec<Event>) -> Result<(), DomainError> {
        *self
            .recorder
            .batches
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default() += 1;
        let failing = events.iter().any(|event| {
            event.event_type.segments().first() == self.fail_on.as_ref()
        });
        self.recorder
            .events
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .extend(events);

        if failing {
            return Err(DomainError::adapter("cannot process event"));
        }
        Ok(())
    }

    async fn create_session(
        &self,
        owner: SessionOwner,
        notify: NotifyCallback,
    ) -> Result<Arc<dyn AdapterSession>, DomainError> {
        if self.fail_session {
            return Err(DomainError::adapter("session refused"));
        }
        let group = self.group.child();
        self.recorder.sessions.lock().unwrap().push((
            self.name.clone(),
            owner.user.clone(),
            group.clone(),
        ));

        Ok(Arc::new(MockSession {
            adapter: self.name.clone(),
            group,
            state: JsonStorage::with_value(json!({"user": owner.user})),
            notify,
            recorder: self.recorder.clone(),
        }))
    }
}

/// Session answering a fixed set of requests:
///
/// - `echo` - returns the request data
/// - `set` - replaces the session state with the request data
/// - `notify` - sends a `hello` notification carrying the request data
/// - `block` - waits for the recorder's gate, then echoes
/// - anything else fails with an adapter error
pub struct MockSession {
    adapter: String,
    group: ResourceGroup,
    state: JsonStorage,
    notify: NotifyCallback,
    recorder: Arc<Recorder>,
}

impl Resource for MockSession {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

#[async_trait]
impl AdapterSession for MockSession {
    fn state(&self) -> &JsonStorage {
        &self.state
    }

    async fn process_request(&self, name: &str, data: Value) -> Result<Value, DomainError> {
        self.recorder
            .requests
            .lock()
            .unwrap()
            .push((self.adapter.clone(), name.to_string()));
        match name {
            "echo" => Ok(data),
            "set" => {
                self.state.set(data);
                Ok(Value::Null)
            }
            "notify" => {
                (self.notify)("hello", data);
                Ok(Value::Null)
            }
            "block" => {
                self.recorder.gate.notified().await;
                Ok(data)
            }
            other => Err(DomainError::adapter(format!("unknown request '{}'", other))),
        }
    }
}

// =============================================================================
// Client server
// =============================================================================

/// Client server that accepts no connections. Records the context of every
/// incarnation it serves.
#[derive(Default)]
pub struct IdleServer {
    contexts: Mutex<Vec<Arc<ConnectionContext>>>,
}

impl IdleServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times `serve` was called.
    pub fn started(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn last_context(&self) -> Option<Arc<ConnectionContext>> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ClientServer for IdleServer {
    async fn serve(
        &self,
        context: Arc<ConnectionContext>,
        group: ResourceGroup,
    ) -> Result<(), DomainError> {
        self.contexts.lock().unwrap().push(context);
        group.wait_closing().await;
        Ok(())
    }
}

// =============================================================================
// Contexts
// =============================================================================

pub fn adapter_config(conf: Value) -> AdapterConfig {
    serde_json::from_value(conf).unwrap()
}

pub fn user(name: &str, password: &str, roles: &[&str], view: Option<&str>) -> UserEntry {
    UserEntry {
        user: User {
            name: name.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            view: view.map(str::to_string),
        },
        password: PasswordRecord::generate(password, None),
    }
}

/// Directory with `alice` (password `secret`, view `main`) and `bob`
/// (password `hunter2`, no view).
pub fn users() -> Arc<UserDirectory> {
    Arc::new(
        UserDirectory::new(vec![
            user("alice", "secret", &["operator"], Some("main")),
            user("bob", "hunter2", &[], None),
        ])
        .unwrap(),
    )
}

pub fn view(name: &str) -> View {
    let mut files = std::collections::BTreeMap::new();
    files.insert(
        "index.html".to_string(),
        ViewFile::Text(format!("<h1>{}</h1>", name)),
    );
    View {
        name: name.to_string(),
        conf: json!({"title": name}),
        files,
    }
}

pub fn views() -> Arc<InMemoryViewProvider> {
    Arc::new(
        InMemoryViewProvider::new()
            .with_view(view("login"))
            .with_view(view("main")),
    )
}

/// Connection context over a registry created from `adapters`.
pub async fn connection_context(
    plugin: &Arc<MockPlugin>,
    adapters: &[AdapterConfig],
    client: Arc<dyn EventBusClient>,
    parent: &ResourceGroup,
) -> Arc<ConnectionContext> {
    let registry = AdapterRegistry::create(adapters, &plugin.registry(), client, parent)
        .await
        .unwrap();
    Arc::new(ConnectionContext {
        registry: Arc::new(registry),
        users: users(),
        views: views(),
        initial_view: Some("login".to_string()),
    })
}

pub fn stack_context(
    plugin: &Arc<MockPlugin>,
    adapters: Vec<AdapterConfig>,
    server: Arc<dyn ClientServer>,
) -> Arc<StackContext> {
    Arc::new(StackContext {
        adapters,
        plugins: plugin.registry(),
        users: users(),
        views: views(),
        initial_view: Some("login".to_string()),
        server,
    })
}
