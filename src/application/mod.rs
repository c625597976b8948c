//! Application layer - coordination between the domain and the ports.
//!
//! - `PluginRegistry` resolves configured adapter modules to factories.
//! - `AdapterRegistry` owns the adapters of one stack and routes events.
//! - `SessionProxy` serializes one client's requests to one adapter session.
//! - `Client` drives one client connection through login and logout.
//! - `StackRunner` is one incarnation of registry plus client server.
//! - `Supervisor` starts and stops incarnations as the event bus comes and goes.

mod client;
mod plugins;
mod registry;
mod runner;
mod session_proxy;
mod supervisor;

pub use client::{Client, ConnectionContext};
pub use plugins::PluginRegistry;
pub use registry::AdapterRegistry;
pub use runner::{ClientServer, StackContext, StackRunner};
pub use session_proxy::{PendingResponse, SessionProxy};
pub use supervisor::Supervisor;
