//! HTTP server for browser clients.
//!
//! Routes:
//! - `GET /ws` - WebSocket connection
//! - `GET /client_conf` - client configuration from `server.client`
//! - everything else - static UI files from `server.ui_path`, if configured

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, routing::get, Json, Router};
use http::Method;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::application::{ClientServer, ConnectionContext};
use crate::config::ServerConfig;
use crate::domain::foundation::{DomainError, ErrorCode, ResourceGroup};

use super::handler::{ws_handler, WebSocketState};

/// Serves browser clients over HTTP and WebSocket.
#[derive(Debug, Clone)]
pub struct WsServer {
    config: ServerConfig,
}

impl WsServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Builds the router for one stack incarnation.
    ///
    /// Connections are created as children of `group`.
    pub fn router(&self, context: Arc<ConnectionContext>, group: ResourceGroup) -> Router {
        let ws_state = WebSocketState {
            context,
            group,
            autoflush_delay: self.config.autoflush_delay(),
        };
        let client_conf = Arc::new(self.config.client.clone().unwrap_or(Value::Null));

        let mut router = Router::new()
            .route("/ws", get(ws_handler).with_state(ws_state))
            .route("/client_conf", get(get_client_conf).with_state(client_conf));

        if let Some(ui_path) = &self.config.ui_path {
            router = router.fallback_service(ServeDir::new(ui_path));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(self.cors_layer())
    }

    fn cors_layer(&self) -> CorsLayer {
        let origins = self.config.cors_origins_list();
        let cors = CorsLayer::new().allow_methods([Method::GET]);

        if origins.iter().any(|o| o == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(origins)
        }
    }
}

#[async_trait]
impl ClientServer for WsServer {
    async fn serve(
        &self,
        context: Arc<ConnectionContext>,
        group: ResourceGroup,
    ) -> Result<(), DomainError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| DomainError::configuration(e.to_string()))?;
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            DomainError::new(ErrorCode::InternalError, format!("cannot listen on {}: {}", addr, e))
        })?;
        info!(%addr, "Listening for clients");

        let router = self.router(context, group.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { group.wait_closing().await })
            .await
            .map_err(|e| DomainError::new(ErrorCode::InternalError, format!("server failed: {}", e)))?;

        info!(%addr, "Stopped listening");
        Ok(())
    }
}

async fn get_client_conf(State(conf): State<Arc<Value>>) -> Json<Value> {
    Json(conf.as_ref().clone())
}
