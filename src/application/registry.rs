//! AdapterRegistry - creates the configured adapters and routes events to them.
//!
//! Routing works on whole batches: each batch is partitioned per adapter,
//! keeping the bus order inside every partition, and each non-empty
//! partition is handed to its adapter. Adapters of one batch run
//! concurrently; the registry finishes a batch before it accepts the next,
//! so an adapter never processes two batches at once.
//!
//! An adapter that fails to process its partition is closed. From then on
//! it is skipped by routing and excluded from new client sessions, while
//! the remaining adapters keep operating.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, trace, warn};

use crate::config::AdapterConfig;
use crate::domain::event::{Event, Subscription};
use crate::domain::foundation::{DomainError, Resource, ResourceGroup};
use crate::ports::{Adapter, EventBusClient};

use super::PluginRegistry;

struct AdapterEntry {
    name: String,
    subscription: Subscription,
    adapter: Arc<dyn Adapter>,
}

/// Live adapters of one serving stack, in configuration order.
pub struct AdapterRegistry {
    group: ResourceGroup,
    entries: Vec<AdapterEntry>,
}

impl AdapterRegistry {
    /// Creates every configured adapter.
    ///
    /// The registry's group is a child of `parent`. Closing it closes every
    /// adapter.
    ///
    /// # Errors
    ///
    /// Duplicate names, unknown modules and failing factories are
    /// configuration errors. Adapters created before the failure are closed
    /// before returning.
    pub async fn create(
        adapters: &[AdapterConfig],
        plugins: &PluginRegistry,
        client: Arc<dyn EventBusClient>,
        parent: &ResourceGroup,
    ) -> Result<Self, DomainError> {
        let mut names = HashSet::new();
        for conf in adapters {
            if !names.insert(conf.name.as_str()) {
                return Err(DomainError::configuration(format!(
                    "duplicate adapter name '{}'",
                    conf.name
                )));
            }
        }

        let mut registry = Self {
            group: parent.child(),
            entries: Vec::with_capacity(adapters.len()),
        };

        if let Err(err) = registry.populate(adapters, plugins, client).await {
            registry.group.async_close().await;
            return Err(err);
        }

        Ok(registry)
    }

    async fn populate(
        &mut self,
        adapters: &[AdapterConfig],
        plugins: &PluginRegistry,
        client: Arc<dyn EventBusClient>,
    ) -> Result<(), DomainError> {
        for conf in adapters {
            let factory = plugins.get(&conf.module)?;
            let conf_value = conf.conf();
            let subscription = factory.create_subscription(&conf_value)?;
            let adapter = factory
                .create_adapter(&conf_value, client.clone())
                .await
                .map_err(|err| err.with_detail("adapter", conf.name.clone()))?;

            self.group.own(adapter.group());
            debug!(adapter = %conf.name, module = %conf.module, "Adapter created");
            self.entries.push(AdapterEntry {
                name: conf.name.clone(),
                subscription,
                adapter,
            });
        }
        Ok(())
    }

    /// Routes one batch of events.
    pub async fn process_events(&self, events: Vec<Event>) {
        let batches = self.entries.iter().filter_map(|entry| {
            if !entry.adapter.is_open() {
                return None;
            }
            let batch: Vec<Event> = events
                .iter()
                .filter(|event| entry.subscription.matches(&event.event_type))
                .cloned()
                .collect();
            (!batch.is_empty()).then_some((entry, batch))
        });

        join_all(batches.map(|(entry, batch)| async move {
            trace!(adapter = %entry.name, events = batch.len(), "Routing events");
            if let Err(err) = entry.adapter.process_events(batch).await {
                warn!(adapter = %entry.name, error = %err, "Adapter failed processing events, closing it");
                entry.adapter.close();
            }
        }))
        .await;
    }

    /// Live adapters with their names, in configuration order.
    pub fn live_adapters(&self) -> Vec<(String, Arc<dyn Adapter>)> {
        self.entries
            .iter()
            .filter(|entry| entry.adapter.is_open())
            .map(|entry| (entry.name.clone(), entry.adapter.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Resource for AdapterRegistry {
    fn group(&self) -> &ResourceGroup {
        &self.group
    }
}
