//! Server state shared by device connections and the admin API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::ServerConfig;
use crate::protocol::{NegotiationHandler, SecurityHandler};
use crate::store::{InMemoryStore, SecurityStore, Store};

/// Application state shared across connections and handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Device data
    pub store: Arc<dyn Store>,
    /// Security profiles
    pub security_store: Arc<dyn SecurityStore>,
    /// Envelope authentication
    pub security: SecurityHandler,
    /// Password negotiation
    pub negotiation: NegotiationHandler,
    /// Server start time
    pub start_time: Instant,
    connections: AtomicUsize,
}

impl AppState {
    /// State backed by one in-memory store
    pub fn new(config: ServerConfig, store: Arc<InMemoryStore>) -> Self {
        Self::from_parts(config, store.clone(), store)
    }

    /// State backed by separate stores
    pub fn from_parts(
        config: ServerConfig,
        store: Arc<dyn Store>,
        security_store: Arc<dyn SecurityStore>,
    ) -> Self {
        let security =
            SecurityHandler::new(security_store.clone()).with_max_attempts(config.max_auth_attempts);
        let negotiation = NegotiationHandler::new(security_store.clone());
        Self {
            config,
            store,
            security_store,
            security,
            negotiation,
            start_time: Instant::now(),
            connections: AtomicUsize::new(0),
        }
    }

    /// Replace the negotiation handler, e.g. to control generated passwords
    pub fn with_negotiation(mut self, negotiation: NegotiationHandler) -> Self {
        self.negotiation = negotiation;
        self
    }

    /// Get server uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Open device connections
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a connection until the guard drops
    pub(crate) fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            state: Arc::clone(self),
        }
    }
}

pub(crate) struct ConnectionGuard {
    state: Arc<AppState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::Relaxed);
    }
}
