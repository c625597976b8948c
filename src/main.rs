//! opview server binary.
//!
//! Usage: `opview [CONFIG_FILE]`
//!
//! Runs the serving stack on an embedded in-memory event bus, which makes
//! the binary a standalone demo: clients can connect and log in, and
//! adapters see only what is published in process.
//!
//! Configuration is read from the optional file and `OPVIEW__*`
//! environment variables. Logging honours `RUST_LOG` and falls back to
//! `server.log_level`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opview::adapters::{InMemoryEventBus, JsonSchemaValidator, ViewDirectory, WsServer};
use opview::application::{PluginRegistry, StackContext, Supervisor};
use opview::config::{AppConfig, ServerConfig, UserConfig};
use opview::domain::foundation::Resource;
use opview::domain::stack::BusStatus;
use opview::domain::user::UserDirectory;
use opview::ports::SchemaValidator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    init_tracing(&config.server);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting opview");

    config.validate()?;

    let validator: Arc<dyn SchemaValidator> = Arc::new(JsonSchemaValidator::new());
    let plugins = PluginRegistry::builtin();
    plugins.validate_adapters(&config.adapters, validator.as_ref())?;

    let users = UserDirectory::new(config.users.iter().map(UserConfig::to_entry))?;
    let views = ViewDirectory::new(
        config.views.clone(),
        config.server.builtin_views_path.clone(),
        validator,
    );

    // Demo mode: the bus is embedded and nothing publishes to it unless the
    // process is extended to do so. Deployments against an external bus or
    // cluster monitor drive `Supervisor::run_direct` / `run_monitor` from the
    // library with their own `EventBusClient` / `ClusterMonitor`.
    let subscription = plugins.subscription(&config.adapters)?;
    info!(query_types = ?subscription.query_types(), "Subscribing to event bus");
    let bus = InMemoryEventBus::new();
    let bus_client = bus.subscribed_client(subscription);
    bus.set_status(BusStatus::Operational);

    let context = Arc::new(StackContext {
        adapters: config.adapters.clone(),
        plugins,
        users: Arc::new(users),
        views: Arc::new(views),
        initial_view: config.server.initial_view.clone(),
        server: Arc::new(WsServer::new(config.server.clone())),
    });
    let supervisor = Supervisor::new(context, config.event_bus.require_operational);

    let result = tokio::select! {
        result = supervisor.run_direct(bus_client) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    supervisor.group().async_close().await;

    if let Err(err) = &result {
        error!(error = %err, "Stopped with error");
    }
    info!("Stopped");
    result.map_err(Into::into)
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if server.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
