//! StackRunner - one incarnation of the serving stack.
//!
//! An incarnation creates the adapter registry on top of a connected event
//! bus client, starts the client server, and then routes event batches
//! until it is closed. Batches pushed while the registry is still being
//! created are buffered and routed, in order, once it is ready. Buffered
//! batches belong to their incarnation: a new runner always starts empty.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, trace};

use crate::config::AdapterConfig;
use crate::domain::event::Event;
use crate::domain::foundation::{DomainError, ErrorCode, Resource, ResourceGroup};
use crate::domain::user::UserDirectory;
use crate::ports::{EventBusClient, ViewProvider};

use super::{AdapterRegistry, ConnectionContext, PluginRegistry};

/// Accepts client connections for one stack incarnation.
#[async_trait]
pub trait ClientServer: Send + Sync {
    /// Serves connections until `group` closes.
    ///
    /// Every connection must be created inside `group`. Returning before
    /// the group closes ends the incarnation.
    async fn serve(
        &self,
        context: Arc<ConnectionContext>,
        group: ResourceGroup,
    ) -> Result<(), DomainError>;
}

/// Everything needed to build a stack, shared by all incarnations.
pub struct StackContext {
    pub adapters: Vec<AdapterConfig>,
    pub plugins: PluginRegistry,
    pub users: Arc<UserDirectory>,
    pub views: Arc<dyn ViewProvider>,
    pub initial_view: Option<String>,
    pub server: Arc<dyn ClientServer>,
}

type Outcome = Option<Result<(), DomainError>>;

/// Handle to a running stack incarnation.
pub struct StackRunner {
    group: ResourceGroup,
    events: mpsc::UnboundedSender<Vec<Event>>,
    done: watch::Receiver<Outcome>,
}

impl StackRunner {
    /// Starts a new incarnation as a child of `parent`.
    pub fn start(
        context: Arc<StackContext>,
        client: Arc<dyn EventBusClient>,
        parent: &ResourceGroup,
    ) -> Self {
        let group = parent.child();
        let (events, queue) = mpsc::unbounded_channel();
        let (done_tx, done) = watch::channel(None);

        group.spawn_uncancellable(run_stack(context, client, group.clone(), queue, done_tx));

        Self {
            group,
            events,
            done,
        }
    }

    /// Queues a batch for routing. Batches are dropped once the runner
    /// stops.
    pub fn push_events(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        if self.events.send(events).is_err() {
            trace!("Stack stopped, dropping events");
        }
    }

    /// Waits for the incarnation to end.
    ///
    /// Ends with `Ok` when the runner was closed, and with the cause when
    /// the stack failed on its own.
    pub async fn wait_done(&self) -> Result<(), DomainError> {
        let mut done = self.done.clone();
        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone())
            .unwrap_or(None);
        outcome.unwrap_or(Ok(()))
    }
}

impl Resource for StackRunner {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

async fn run_stack(
    context: Arc<StackContext>,
    client: Arc<dyn EventBusClient>,
    group: ResourceGroup,
    mut queue: mpsc::UnboundedReceiver<Vec<Event>>,
    done: watch::Sender<Outcome>,
) {
    debug!("Starting stack");
    let registry_group = group.child();
    let server_group = group.child();

    let result = run_incarnation(
        &context,
        client,
        &group,
        &registry_group,
        &server_group,
        &mut queue,
    )
    .await;

    queue.close();
    server_group.async_close().await;
    registry_group.async_close().await;

    match &result {
        Ok(()) => debug!("Stack stopped"),
        Err(err) => error!(error = %err, "Stack failed"),
    }
    done.send_replace(Some(result));
    group.close();
}

async fn run_incarnation(
    context: &StackContext,
    client: Arc<dyn EventBusClient>,
    group: &ResourceGroup,
    registry_group: &ResourceGroup,
    server_group: &ResourceGroup,
    queue: &mut mpsc::UnboundedReceiver<Vec<Event>>,
) -> Result<(), DomainError> {
    let registry = tokio::select! {
        biased;
        _ = group.wait_closing() => return Ok(()),
        registry = AdapterRegistry::create(&context.adapters, &context.plugins, client, registry_group) => {
            Arc::new(registry?)
        }
    };
    debug!(adapters = registry.len(), "Adapter registry ready");

    let connection_context = Arc::new(ConnectionContext {
        registry: registry.clone(),
        users: context.users.clone(),
        views: context.views.clone(),
        initial_view: context.initial_view.clone(),
    });

    let (server_tx, mut server_rx) = oneshot::channel();
    let server = context.server.clone();
    let serving_group = server_group.clone();
    server_group.spawn(async move {
        let result = server.serve(connection_context, serving_group).await;
        let _ = server_tx.send(result);
    });

    loop {
        tokio::select! {
            biased;
            _ = group.wait_closing() => return Ok(()),
            result = &mut server_rx => {
                return match result {
                    Ok(Err(err)) => Err(err),
                    _ => Err(DomainError::new(ErrorCode::InternalError, "client server stopped")),
                };
            }
            batch = queue.recv() => match batch {
                Some(events) => {
                    tokio::select! {
                        biased;
                        _ = group.wait_closing() => return Ok(()),
                        _ = registry.process_events(events) => {}
                    }
                }
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::view::InMemoryViewProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IdleServer {
        served: AtomicUsize,
    }

    #[async_trait]
    impl ClientServer for IdleServer {
        async fn serve(
            &self,
            _context: Arc<ConnectionContext>,
            group: ResourceGroup,
        ) -> Result<(), DomainError> {
            self.served.fetch_add(1, Ordering::SeqCst);
            group.wait_closing().await;
            Ok(())
        }
    }

    struct FailingServer;

    #[async_trait]
    impl ClientServer for FailingServer {
        async fn serve(
            &self,
            _context: Arc<ConnectionContext>,
            _group: ResourceGroup,
        ) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::InternalError, "bind failed"))
        }
    }

    fn context(adapters: Vec<AdapterConfig>, server: Arc<dyn ClientServer>) -> Arc<StackContext> {
        Arc::new(StackContext {
            adapters,
            plugins: PluginRegistry::builtin(),
            users: Arc::new(UserDirectory::new(Vec::new()).unwrap()),
            views: Arc::new(InMemoryViewProvider::default()),
            initial_view: None,
            server,
        })
    }

    #[tokio::test]
    async fn closing_runner_ends_with_ok() {
        let server = Arc::new(IdleServer {
            served: AtomicUsize::new(0),
        });
        let bus = InMemoryEventBus::new();
        let parent = ResourceGroup::new();
        let runner = StackRunner::start(context(Vec::new(), server.clone()), bus.client(), &parent);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(server.served.load(Ordering::SeqCst), 1);

        runner.group().async_close().await;
        assert!(runner.wait_done().await.is_ok());
    }

    #[tokio::test]
    async fn server_failure_ends_runner_with_error() {
        let bus = InMemoryEventBus::new();
        let parent = ResourceGroup::new();
        let runner = StackRunner::start(
            context(Vec::new(), Arc::new(FailingServer)),
            bus.client(),
            &parent,
        );

        let err = runner.wait_done().await.unwrap_err();
        assert_eq!(err.message, "bind failed");
        runner.group().wait_closed().await;
    }

    #[tokio::test]
    async fn unknown_adapter_module_fails_runner() {
        let bus = InMemoryEventBus::new();
        let parent = ResourceGroup::new();
        let adapters = vec![serde_json::from_value(serde_json::json!({
            "name": "a",
            "module": "missing"
        }))
        .unwrap()];
        let server = Arc::new(IdleServer {
            served: AtomicUsize::new(0),
        });
        let runner = StackRunner::start(context(adapters, server.clone()), bus.client(), &parent);

        let err = runner.wait_done().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigurationError);
        assert_eq!(server.served.load(Ordering::SeqCst), 0);
    }
}
