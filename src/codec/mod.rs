//! M3DA codecs and cryptographic primitives.
//!
//! ```text
//! bytes ──► EnvelopeDecoder ──► Envelope { header, payload, footer }
//!                                              │
//!                          crypto (checksum, cipher) on payload
//!                                              │
//!                               BysantDecoder ──► Message / Response
//! ```
//!
//! The [`bysant`] module encodes typed values; [`envelope`] frames one
//! envelope per exchange on top of it; [`crypto`] holds the keyed checksum,
//! the payload ciphers and the ECDH primitives used for password rotation.

pub mod bysant;
pub mod crypto;
pub mod envelope;
mod error;
pub mod pdu;
pub mod varint;

pub use bysant::{BysantDecoder, DecoderOutput, Value};
pub use envelope::{EnvelopeDecoder, EnvelopeEncoder};
pub use error::DecodeError;
pub use pdu::{Envelope, Header, HeaderKey, Message, Pdu, Response, StatusCode};
