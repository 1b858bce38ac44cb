//! M3DA error types.
//!
//! Each layer has its own error enum; [`M3daError`] aggregates them for
//! callers that drive the whole stack.
//!
//! | Layer        | Error               | Typical handling                    |
//! |--------------|---------------------|-------------------------------------|
//! | Bysant codec | [`DecodeError`]     | close the connection                |
//! | Crypto       | [`CryptoError`]     | reject the envelope                 |
//! | Security     | [`SecurityError`]   | run negotiation, or close           |
//! | Negotiation  | [`NegotiationError`]| answer 403 and close                |
//! | Store        | [`StoreError`]      | log, retry on next flush            |
//! | Client       | [`ClientError`]     | surface to the caller               |
//!
//! Authentication failures are not errors: they come back as an
//! [`AuthenticationResult`](crate::protocol::AuthenticationResult) carrying
//! the envelope for the device.

use thiserror::Error;

use crate::client::ClientError;
use crate::codec::crypto::CryptoError;
use crate::codec::DecodeError;
use crate::protocol::{NegotiationError, SecurityError};
use crate::store::StoreError;

/// M3DA errors.
#[derive(Error, Debug)]
pub enum M3daError {
    /// Malformed bytes on the wire.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Cryptographic operation failed.
    ///
    /// The full error chain is kept via `#[source]`.
    #[error("Crypto error: {0}")]
    Crypto(#[source] CryptoError),

    /// Security layer could not decide on an envelope.
    #[error("Security error: {0}")]
    Security(#[from] SecurityError),

    /// Password negotiation failed.
    #[error("Negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Store persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Client-side exchange failed.
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Protocol-level error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server-side error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for M3DA operations
pub type Result<T> = std::result::Result<T, M3daError>;

impl From<CryptoError> for M3daError {
    fn from(err: CryptoError) -> Self {
        M3daError::Crypto(err)
    }
}

impl From<toml::de::Error> for M3daError {
    fn from(err: toml::de::Error) -> Self {
        M3daError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;
    use crate::codec::crypto::ChecksumError;

    #[test]
    fn test_crypto_source_chain() {
        let err = M3daError::from(CryptoError::from(ChecksumError::VerificationFailed));
        assert!(err.to_string().starts_with("Crypto error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_decode_conversion() {
        let err: M3daError = DecodeError::TrailingBytes { remaining: 3 }.into();
        assert!(matches!(err, M3daError::Decode(_)));
    }
}
