//! Storage collaborators of the M3DA server.
//!
//! The protocol core reads and writes through two traits:
//!
//! | Trait           | Holds                                             |
//! |-----------------|---------------------------------------------------|
//! | [`Store`]       | received device data and queued outbound messages |
//! | [`SecurityStore`] | per-device security profiles, nonces, passwords |
//!
//! Implementations own their synchronization; every method takes `&self`.
//! [`InMemoryStore`] implements both.

mod ingest;
mod memory;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::codec::bysant::Value;
use crate::codec::pdu::Message;
use crate::protocol::SecurityInfo;

pub use memory::{InMemoryStore, DEFAULT_FLUSH_INTERVAL_SECS};

/// One value with the time it was sampled, in milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    pub timestamp_ms: i64,
    pub value: Value,
}

impl DataValue {
    pub fn new(timestamp_ms: i64, value: impl Into<Value>) -> Self {
        Self {
            timestamp_ms,
            value: value.into(),
        }
    }
}

/// Data received for one path, as a list of samples per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedMessage {
    pub path: String,
    pub data: BTreeMap<String, Vec<DataValue>>,
}

/// All messages of one received envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedEnvelope {
    /// Reception wall-clock time, milliseconds since the epoch
    pub reception_ms: i64,
    pub messages: Vec<ReceivedMessage>,
}

/// Device data exchanged with the server.
pub trait Store: Send + Sync {
    /// Record an envelope received from `client_id`.
    ///
    /// `reception_nanos` orders envelopes of one client; callers keep it
    /// strictly increasing.
    fn enqueue_received_data(&self, client_id: &str, reception_nanos: u64, envelope: ReceivedEnvelope);

    /// Retained envelopes of `client_id`, oldest first.
    fn last_received_data(&self, client_id: &str) -> BTreeMap<u64, ReceivedEnvelope>;

    /// Queue messages for the next exchange with `client_id`.
    fn enqueue_data_to_send(&self, client_id: &str, messages: Vec<Message>);

    /// Take every message queued for `client_id`.
    fn pop_data_to_send(&self, client_id: &str) -> Option<Vec<Message>>;

    /// Clients with received data.
    fn incoming_client_ids(&self) -> BTreeSet<String>;

    /// Clients with queued outbound data.
    fn outgoing_client_ids(&self) -> BTreeSet<String>;
}

/// Per-device security profiles.
pub trait SecurityStore: Send + Sync {
    fn security_info(&self, client_id: &str) -> Option<SecurityInfo>;

    /// Remember the last nonce issued to `client_id`.
    fn store_nonce(&self, client_id: &str, nonce: &str);

    /// Replace the working credential of `client_id` after negotiation.
    fn store_new_password(&self, client_id: &str, password: &str);

    /// Register or replace a profile.
    fn add_security_info(&self, info: SecurityInfo);
}

/// Persistence failure of a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed security file {path}: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
