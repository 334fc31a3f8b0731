//! Gateway server: router, dispatcher, and background tasks.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::{ChatConfig, ServerConfig};
use crate::db::Database;

use super::dispatcher::Dispatcher;
use super::event::GatewayEvent;
use super::reaper::start_idle_reaper;
use super::ws::{ws_handler, GatewayState};

/// Capacity of the dispatcher event queue.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// The WebSocket gateway server.
pub struct GatewayServer {
    addr: SocketAddr,
    db: Database,
    server_config: ServerConfig,
    chat_config: ChatConfig,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(server_config: &ServerConfig, chat_config: &ChatConfig, db: Database) -> Self {
        let addr = format!("{}:{}", server_config.host, server_config.port)
            .parse()
            .expect("Invalid gateway server address");

        Self {
            addr,
            db,
            server_config: server_config.clone(),
            chat_config: chat_config.clone(),
        }
    }

    /// Get the configured address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn cors_layer(&self) -> CorsLayer {
        if self.server_config.cors_origins.is_empty() {
            return CorsLayer::new().allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .server_config
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }

    fn build_router(&self, events: mpsc::Sender<GatewayEvent>) -> Router {
        let state = Arc::new(GatewayState { events });

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .layer(self.cors_layer())
            .with_state(state)
    }

    /// Start the dispatcher and reaper, then serve until shutdown.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let (listener, router) = self.bind_and_spawn().await?;
        let local_addr = listener.local_addr()?;
        info!("Gateway listening on ws://{}/ws", local_addr);
        axum::serve(listener, router).await
    }

    /// Start serving in the background and return the bound address.
    ///
    /// Useful for tests binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr, std::io::Error> {
        let (listener, router) = self.bind_and_spawn().await?;
        let local_addr = listener.local_addr()?;
        info!("Gateway listening on ws://{}/ws", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!("Gateway server error: {}", e);
            }
        });

        Ok(local_addr)
    }

    async fn bind_and_spawn(self) -> Result<(TcpListener, Router), std::io::Error> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let mut dispatcher = Dispatcher::new(self.db.clone(), self.chat_config.clone());
        dispatcher.init().await;
        tokio::spawn(dispatcher.run(events_rx));

        start_idle_reaper(events_tx.clone(), self.chat_config.sweep_interval());

        let router = self.build_router(events_tx);
        let listener = TcpListener::bind(self.addr).await?;

        Ok((listener, router))
    }
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_configs() -> (ServerConfig, ChatConfig) {
        (
            ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec![],
            },
            ChatConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_gateway_server_new() {
        let db = Database::open_in_memory().await.unwrap();
        let (server_config, chat_config) = test_configs();

        let server = GatewayServer::new(&server_config, &chat_config, db);
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_gateway_server_binds() {
        let db = Database::open_in_memory().await.unwrap();
        let (server_config, chat_config) = test_configs();

        let server = GatewayServer::new(&server_config, &chat_config, db);
        let addr = server.run_with_addr().await.unwrap();
        assert_ne!(addr.port(), 0);
    }
}
