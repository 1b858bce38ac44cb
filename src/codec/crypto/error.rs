//! Unified cryptographic error type.
//!
//! | Error      | Source                                  |
//! |------------|-----------------------------------------|
//! | `Checksum` | keyed checksum mismatch, unknown kind   |
//! | `Cipher`   | payload cipher key, padding or I/O      |
//! | `Exchange` | ECDH certificate or secret cipher input |

use thiserror::Error;

use super::checksum::ChecksumError;
use super::cipher::CipherError;
use super::exchange::KeyExchangeError;

/// Unified error type for all cryptographic operations.
///
/// The full error chain is kept via `#[source]`.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Keyed checksum error.
    #[error("Checksum: {0}")]
    Checksum(#[source] ChecksumError),

    /// Payload cipher error.
    #[error("Cipher: {0}")]
    Cipher(#[source] CipherError),

    /// Key exchange error (P-256).
    #[error("Key exchange: {0}")]
    Exchange(#[source] KeyExchangeError),
}

impl From<ChecksumError> for CryptoError {
    fn from(err: ChecksumError) -> Self {
        CryptoError::Checksum(err)
    }
}

impl From<CipherError> for CryptoError {
    fn from(err: CipherError) -> Self {
        CryptoError::Cipher(err)
    }
}

impl From<KeyExchangeError> for CryptoError {
    fn from(err: KeyExchangeError) -> Self {
        CryptoError::Exchange(err)
    }
}
