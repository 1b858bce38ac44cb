//! M3DA server.
//!
//! Two listeners share one [`AppState`]:
//! - the M3DA TCP listener, where devices exchange envelopes
//! - the admin HTTP API, where operators read data, queue settings and
//!   register security profiles
//!
//! # Example
//!
//! ```rust,ignore
//! use m3da::server::{run, ServerConfig};
//!
//! let config = ServerConfig::default().with_tcp_port(44900);
//! run(config).await?;
//! ```

mod api;
mod config;
mod connection;
mod state;
mod tcp;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use api::{
    create_router, health_check, map_data_to_send, map_received_data, ClientsResponse, ReadData,
    SecurityRequest, WriteData, WriteSettings,
};
pub use config::{ServerConfig, DEFAULT_API_PORT, DEFAULT_MAX_MESSAGES, DEFAULT_TCP_PORT};
pub use connection::{Connection, Reaction};
pub use state::AppState;
pub use tcp::M3daTcpServer;

use crate::error::{M3daError, Result};
use crate::store::InMemoryStore;

/// Run the TCP server and the admin API until either fails or ctrl-c.
///
/// Security profiles are loaded from the configured file at startup, flushed
/// periodically and saved once more on shutdown.
pub async fn run(config: ServerConfig) -> Result<()> {
    let mut store = InMemoryStore::new(config.max_messages);
    if let Some(path) = &config.security_file {
        store = store.with_security_file(path.clone());
    }
    store.load_security()?;
    let store = Arc::new(store);
    let flush = store.spawn_flush_task(config.flush_interval);

    let app = Arc::new(AppState::new(config, store.clone()));
    let tcp = M3daTcpServer::bind(app.clone()).await?;

    let api_addr = app.config.api_addr;
    let listener = TcpListener::bind(api_addr)
        .await
        .map_err(|e| M3daError::Server(format!("Failed to bind HTTP to {}: {}", api_addr, e)))?;
    tracing::info!("Admin API listening on http://{}", api_addr);
    let router = create_router(app);

    let outcome = tokio::select! {
        res = tcp.serve() => res,
        res = axum::serve(listener, router) => {
            res.map_err(|e| M3daError::Server(format!("HTTP server error: {}", e)))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    flush.abort();
    store.save_security()?;
    outcome
}
