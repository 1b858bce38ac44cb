//! Cryptographic primitives of the M3DA security layer.
//!
//! - **Keyed checksum**: `D(MD5(user || MD5(password)) || body || salt)`,
//!   D being MD5 or SHA-1
//! - **Payload ciphers**: AES-CTR and AES-CBC keyed from the password and
//!   the peer's nonce
//! - **ECDH P-256**: shared secret for password rotation
//! - **Secret cipher**: 16-byte XOR mask `MD5(secret)` protecting the new
//!   password digest during rotation
//!
//! All functions are pure and hold no session state.

pub mod checksum;
pub mod cipher;
mod error;
pub mod exchange;

pub use checksum::{hmac, hmac_from_digest, md5, ChecksumError, HmacType};
pub use cipher::{cipher, cipher_bytes, CipherAlgorithm, CipherError, CipherMode, KeyIv};
pub use error::CryptoError;
pub use exchange::{cipher_with_secret, EcdhKeyPair, KeyExchangeError, CERTIFICATE_LEN};

/// Random nonce of `len` bytes rendered as lowercase hex.
///
/// Nonces travel as their ASCII hex text, which keeps them printable in
/// the security file.
pub fn generate_nonce(len: usize) -> String {
    use rand::RngCore;

    let mut raw = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut raw);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_shape() {
        let a = generate_nonce(8);
        let b = generate_nonce(8);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
