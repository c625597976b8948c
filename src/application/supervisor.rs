//! Supervisor - decides when the serving stack exists.
//!
//! The stack runs only while an event bus client is connected and, when
//! `require_operational` is set, the bus reports itself operational. Losing
//! either condition tears the stack down; regaining them starts a fresh
//! incarnation with newly created adapters. Every status change is applied
//! in order, so an outage shorter than a scheduling slice still replaces the
//! stack.
//!
//! Two bus modes are supported:
//!
//! - **Direct** - one client, supervision ends when it closes.
//! - **Monitor** - a cluster monitor yields a freshly connected client every
//!   time this process is elected; each client is supervised in turn.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::domain::foundation::{DomainError, ErrorCode, Resource, ResourceGroup, StateMachine};
use crate::domain::stack::{should_run, StackStatus};
use crate::ports::{ClusterMonitor, EventBusClient};

use super::{StackContext, StackRunner};

type RunnerSlot = Option<Arc<StackRunner>>;

/// Owns the serving stack's lifecycle.
pub struct Supervisor {
    group: ResourceGroup,
    context: Arc<StackContext>,
    require_operational: bool,
    status: watch::Sender<StackStatus>,
}

impl Supervisor {
    pub fn new(context: Arc<StackContext>, require_operational: bool) -> Self {
        let (status, _) = watch::channel(StackStatus::Inactive);
        Self {
            group: ResourceGroup::new(),
            context,
            require_operational,
            status,
        }
    }

    /// Whether a stack is currently running.
    pub fn status(&self) -> StackStatus {
        *self.status.borrow()
    }

    /// Receiver observing stack starts and stops.
    pub fn watch_status(&self) -> watch::Receiver<StackStatus> {
        self.status.subscribe()
    }

    /// Supervises a single bus client until it closes.
    ///
    /// # Errors
    ///
    /// Returns the cause when a stack incarnation fails on its own.
    pub async fn run_direct(&self, client: Arc<dyn EventBusClient>) -> Result<(), DomainError> {
        self.supervise(client).await
    }

    /// Supervises every client yielded by the cluster monitor.
    ///
    /// Readiness is announced first. Supervision ends when the monitor or
    /// the supervisor closes.
    pub async fn run_monitor(&self, monitor: Arc<dyn ClusterMonitor>) -> Result<(), DomainError> {
        monitor.set_ready(true);

        loop {
            let client = tokio::select! {
                biased;
                _ = self.group.wait_closing() => return Ok(()),
                _ = monitor.group().wait_closing() => return Ok(()),
                client = monitor.next_client() => match client {
                    Some(client) => client,
                    None => return Ok(()),
                },
            };

            info!("Elected, serving on new event bus client");
            if let Err(err) = self.supervise(client).await {
                monitor.set_ready(false);
                return Err(err);
            }
            info!("Event bus client closed, waiting for next election");
        }
    }

    async fn supervise(&self, client: Arc<dyn EventBusClient>) -> Result<(), DomainError> {
        let client_group = self.group.child();
        let (slot, slot_rx) = watch::channel::<RunnerSlot>(None);

        client_group.spawn(receive_events(client.clone(), slot_rx));

        let result = self.watch_client(&client, &client_group, &slot).await;

        if let Some(runner) = slot.send_replace(None) {
            runner.group().async_close().await;
            self.set_status(StackStatus::Inactive);
        }
        client_group.async_close().await;
        result
    }

    async fn watch_client(
        &self,
        client: &Arc<dyn EventBusClient>,
        client_group: &ResourceGroup,
        slot: &watch::Sender<RunnerSlot>,
    ) -> Result<(), DomainError> {
        let mut statuses = client.status_changes();
        let Some(mut status) = statuses.recv().await else {
            return Ok(());
        };

        loop {
            let run = client.is_open() && should_run(status, self.require_operational);
            let current = slot.borrow().clone();

            match (run, current) {
                (true, None) => {
                    debug!(bus_status = %status, "Starting stack");
                    let runner = StackRunner::start(self.context.clone(), client.clone(), client_group);
                    slot.send_replace(Some(Arc::new(runner)));
                    self.set_status(StackStatus::Active);
                }
                (false, Some(runner)) => {
                    debug!(bus_status = %status, "Stopping stack");
                    slot.send_replace(None);
                    runner.group().async_close().await;
                    self.set_status(StackStatus::Inactive);
                }
                _ => {}
            }

            let runner = slot.borrow().clone();
            tokio::select! {
                biased;
                _ = self.group.wait_closing() => return Ok(()),
                _ = client.group().wait_closing() => return Ok(()),
                next = statuses.recv() => match next {
                    Some(next) => status = next,
                    None => return Ok(()),
                },
                result = wait_runner(runner) => {
                    return match result {
                        Err(err) => Err(err),
                        Ok(()) => Err(DomainError::new(
                            ErrorCode::InternalError,
                            "stack stopped unexpectedly",
                        )),
                    };
                }
            }
        }
    }

    fn set_status(&self, next: StackStatus) {
        let current = *self.status.borrow();
        match current.transition_to(next) {
            Ok(next) => {
                self.status.send_replace(next);
            }
            Err(err) => warn!(error = %err, "Rejected stack status change"),
        }
    }
}

impl Resource for Supervisor {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}

async fn wait_runner(runner: RunnerSlot) -> Result<(), DomainError> {
    match runner {
        Some(runner) => runner.wait_done().await,
        None => std::future::pending().await,
    }
}

/// Forwards received batches to the current runner. Batches arriving while
/// no stack runs are dropped.
async fn receive_events(client: Arc<dyn EventBusClient>, slot: watch::Receiver<RunnerSlot>) {
    loop {
        match client.receive().await {
            Ok(events) => {
                let runner = slot.borrow().clone();
                match runner {
                    Some(runner) => runner.push_events(events),
                    None => trace!(events = events.len(), "No stack running, dropping events"),
                }
            }
            Err(err) => {
                if !err.is_connection_closed() {
                    warn!(error = %err, "Event bus receive failed, closing client");
                }
                client.close();
                return;
            }
        }
    }
}
