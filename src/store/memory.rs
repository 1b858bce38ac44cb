//! In-memory store with optional JSON persistence of security profiles.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use super::{ReceivedEnvelope, SecurityStore, Store, StoreError};
use crate::codec::pdu::Message;
use crate::protocol::SecurityInfo;

/// Default period between two security file flushes (5 minutes).
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Default)]
struct DataState {
    received: HashMap<String, BTreeMap<u64, ReceivedEnvelope>>,
    to_send: HashMap<String, VecDeque<Message>>,
}

/// Store keeping everything in memory.
///
/// Received data is capped at `max_messages` envelopes per client, the
/// oldest being evicted first. Security profiles can be loaded from and
/// flushed to a JSON file.
#[derive(Debug)]
pub struct InMemoryStore {
    max_messages: usize,
    data: Mutex<DataState>,
    security: RwLock<HashMap<String, SecurityInfo>>,
    security_file: Option<PathBuf>,
}

impl InMemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages,
            data: Mutex::new(DataState::default()),
            security: RwLock::new(HashMap::new()),
            security_file: None,
        }
    }

    /// Persist security profiles to `path`.
    pub fn with_security_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.security_file = Some(path.into());
        self
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn security_file(&self) -> Option<&Path> {
        self.security_file.as_deref()
    }

    /// Load profiles from the security file, if one is configured and exists.
    ///
    /// Returns the number of profiles loaded.
    pub fn load_security(&self) -> Result<usize, StoreError> {
        let Some(path) = &self.security_file else {
            return Ok(0);
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no security file, starting with no profiles");
            return Ok(0);
        }

        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: display.clone(),
            source,
        })?;
        let profiles: Vec<SecurityInfo> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Format {
                path: display,
                source,
            })?;

        let count = profiles.len();
        let mut security = self.security.write().unwrap_or_else(PoisonError::into_inner);
        for info in profiles {
            security.insert(info.comm_id.clone(), info);
        }
        tracing::info!(count, path = %path.display(), "security profiles loaded");
        Ok(count)
    }

    /// Write every profile to the security file, if one is configured.
    pub fn save_security(&self) -> Result<(), StoreError> {
        let Some(path) = &self.security_file else {
            return Ok(());
        };
        let display = path.display().to_string();
        let io_err = |source| StoreError::Io {
            path: display.clone(),
            source,
        };

        let mut profiles: Vec<SecurityInfo> = self
            .security
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        profiles.sort_by(|a, b| a.comm_id.cmp(&b.comm_id));

        let json = serde_json::to_string_pretty(&profiles).map_err(|source| StoreError::Format {
            path: display.clone(),
            source,
        })?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        // Write then rename so a crash never leaves a truncated file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        tracing::debug!(count = profiles.len(), path = %path.display(), "security profiles saved");
        Ok(())
    }

    /// Flush security profiles every `period` until the task is aborted.
    pub fn spawn_flush_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let store = Arc::clone(&store);
                match tokio::task::spawn_blocking(move || store.save_security()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "failed to save security profiles"),
                    Err(e) => tracing::error!(error = %e, "security flush task panicked"),
                }
            }
        })
    }

    fn data(&self) -> MutexGuard<'_, DataState> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_security(&self, client_id: &str, update: impl FnOnce(&mut SecurityInfo)) {
        let mut security = self.security.write().unwrap_or_else(PoisonError::into_inner);
        match security.get_mut(client_id) {
            Some(info) => update(info),
            None => tracing::debug!(client_id, "no security profile to update"),
        }
    }
}

impl Store for InMemoryStore {
    fn enqueue_received_data(&self, client_id: &str, reception_nanos: u64, envelope: ReceivedEnvelope) {
        tracing::debug!(
            client_id,
            reception_nanos,
            messages = envelope.messages.len(),
            "enqueue received data"
        );
        let mut data = self.data();
        let queue = data.received.entry(client_id.to_string()).or_default();
        queue.insert(reception_nanos, envelope);
        while queue.len() > self.max_messages {
            queue.pop_first();
        }
    }

    fn last_received_data(&self, client_id: &str) -> BTreeMap<u64, ReceivedEnvelope> {
        self.data()
            .received
            .get(client_id)
            .cloned()
            .unwrap_or_default()
    }

    fn enqueue_data_to_send(&self, client_id: &str, messages: Vec<Message>) {
        tracing::debug!(client_id, count = messages.len(), "enqueue data to send");
        self.data()
            .to_send
            .entry(client_id.to_string())
            .or_default()
            .extend(messages);
    }

    fn pop_data_to_send(&self, client_id: &str) -> Option<Vec<Message>> {
        let mut data = self.data();
        let queue = data.to_send.get_mut(client_id)?;
        Some(queue.drain(..).collect())
    }

    fn incoming_client_ids(&self) -> BTreeSet<String> {
        self.data().received.keys().cloned().collect()
    }

    fn outgoing_client_ids(&self) -> BTreeSet<String> {
        self.data().to_send.keys().cloned().collect()
    }
}

impl SecurityStore for InMemoryStore {
    fn security_info(&self, client_id: &str) -> Option<SecurityInfo> {
        self.security
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client_id)
            .cloned()
    }

    fn store_nonce(&self, client_id: &str, nonce: &str) {
        self.update_security(client_id, |info| info.nonce = nonce.to_string());
    }

    fn store_new_password(&self, client_id: &str, password: &str) {
        self.update_security(client_id, |info| info.credential = Some(password.to_string()));
    }

    fn add_security_info(&self, info: SecurityInfo) {
        tracing::info!(
            client_id = %info.comm_id,
            authentication = %info.authentication,
            encryption = %info.encryption,
            "security profile registered"
        );
        self.security
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.comm_id.clone(), info);
    }
}
