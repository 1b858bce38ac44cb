//! # M3DA - Machine-to-machine telemetry protocol
//!
//! Compact binary protocol between field devices and a data server, with
//! authenticated and optionally ciphered exchanges and an ECDH-based password
//! rotation.
//!
//! ## Features
//!
//! - **Bysant codec**: tag-prefixed binary values, incremental decoding,
//!   compressed numeric vectors
//! - **Envelope framing**: one envelope per exchange with header, payload
//!   and footer
//! - **Security**: HMAC-MD5 / HMAC-SHA1 checksums and AES-CTR / AES-CBC
//!   payload ciphers keyed from a password and a nonce
//! - **Password negotiation**: three-step ECDH P-256 exchange that replaces
//!   a registration password with a server-generated one
//! - **Server**: tokio TCP listener, in-memory store and an axum admin API
//!
//! ### Architecture
//!
//! ```text
//! Device                        M3DA Server                      Operator
//!    |                               |                                |
//!    |--- Envelope {id, nonce, mac} ->|                                |
//!    |       payload: Messages       |---- store received data       |
//!    |                               |<--- POST /clients/:id/data ----|
//!    |<-- Envelope {status, nonce, mac}                               |
//!    |       payload: queued Messages, Responses                      |
//!    |                               |---- GET /clients/:id/data ---->|
//! ```
//!
//! ### Message Types
//!
//! | PDU      | Direction       | Purpose                                 |
//! |----------|-----------------|-----------------------------------------|
//! | Envelope | both            | framing, security headers               |
//! | Message  | both            | path-keyed values, optional ticket      |
//! | Response | both            | acknowledgement of a ticketed Message   |
//!
//! ## Quick Start
//!
//! ### Codec only
//!
//! ```rust,ignore
//! use m3da::codec::{bysant, Message, Pdu, Value};
//!
//! let message = Message::new("@sys.telemetry").with("temp", 21i64);
//! let bytes = bysant::encode(&Value::from(Pdu::Message(message.clone())));
//! let values = bysant::decode(&bytes)?;
//! assert_eq!(values, vec![Value::from(Pdu::Message(message))]);
//! ```
//!
//! ### Server
//!
//! ```rust,ignore
//! use m3da::{server, Config};
//!
//! let config = Config::from_env().server_config()?;
//! server::run(config).await?;
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Bysant values, envelopes and crypto primitives
//! - [`protocol`]: Security profiles, authentication and password negotiation
//! - [`store`]: Received data, outbound queue and security profiles
//! - [`server`]: TCP server and HTTP admin API
//! - [`client`]: TCP client for tests and tooling
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod store;

// Re-exports for convenience
pub use client::{ClientError, M3daTcpClient};
pub use codec::{Envelope, EnvelopeDecoder, EnvelopeEncoder, Message, Pdu, StatusCode, Value};
pub use config::Config;
pub use error::{M3daError, Result};
pub use protocol::{
    Authentication, DeviceCredentials, Encryption, NegotiationHandler, SecurityHandler,
    SecurityInfo, Session,
};
pub use server::{AppState, ServerConfig};
pub use store::{InMemoryStore, SecurityStore, Store};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
