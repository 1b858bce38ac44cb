//! ECDH over NIST P-256 for password rotation.
//!
//! Peers exchange public keys as X9.63 uncompressed points
//! (`0x04 || x || y`, 65 bytes), which is the "certificate" carried in
//! `autoreg_pubkey` headers. The shared secret is the 32-byte x-coordinate.

#![allow(missing_docs)]

use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use thiserror::Error;
use zeroize::Zeroizing;

use super::checksum::md5;

/// Length of an uncompressed P-256 public key.
pub const CERTIFICATE_LEN: usize = 65;

/// Length of the payload protected by [`cipher_with_secret`].
pub const SECRET_CIPHER_LEN: usize = 16;

/// Errors from key exchange operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyExchangeError {
    /// Peer certificate is not a valid uncompressed P-256 point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Private key bytes are not a valid scalar
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Secret cipher payload has the wrong length
    #[error("secret cipher payload must be {SECRET_CIPHER_LEN} bytes, got {0}")]
    PayloadLength(usize),
}

/// P-256 key pair (private + public)
pub struct EcdhKeyPair {
    secret: SecretKey,
    certificate: Vec<u8>,
}

impl EcdhKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::random(&mut rand::rngs::OsRng))
    }

    /// Restore a key pair from a 32-byte big-endian private scalar.
    pub fn from_private(private_key: &[u8]) -> Result<Self, KeyExchangeError> {
        let secret =
            SecretKey::from_slice(private_key).map_err(|_| KeyExchangeError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret))
    }

    fn from_secret_key(secret: SecretKey) -> Self {
        let certificate = secret
            .public_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();
        Self {
            secret,
            certificate,
        }
    }

    /// Public key as an uncompressed X9.63 point.
    pub fn public_key_certificate(&self) -> &[u8] {
        &self.certificate
    }

    /// Shared secret with the holder of `peer_certificate`.
    pub fn compute_shared_secret(
        &self,
        peer_certificate: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, KeyExchangeError> {
        if peer_certificate.len() != CERTIFICATE_LEN || peer_certificate[0] != 0x04 {
            return Err(KeyExchangeError::InvalidPublicKey(format!(
                "expected {} byte uncompressed point, got {} bytes",
                CERTIFICATE_LEN,
                peer_certificate.len()
            )));
        }

        let point = EncodedPoint::from_bytes(peer_certificate)
            .map_err(|_| KeyExchangeError::InvalidPublicKey("malformed point".to_string()))?;
        let peer = PublicKey::from_encoded_point(&point)
            .into_option()
            .ok_or_else(|| KeyExchangeError::InvalidPublicKey("point not on curve".to_string()))?;

        let shared = diffie_hellman(self.secret.to_nonzero_scalar(), peer.as_affine());
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

impl std::fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("certificate_len", &self.certificate.len())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// `payload XOR MD5(secret)` over exactly 16 bytes. Applying it twice with
/// the same secret returns the original payload.
pub fn cipher_with_secret(
    secret: &[u8],
    payload: &[u8],
) -> Result<[u8; SECRET_CIPHER_LEN], KeyExchangeError> {
    if payload.len() != SECRET_CIPHER_LEN {
        return Err(KeyExchangeError::PayloadLength(payload.len()));
    }
    let mask = Zeroizing::new(md5(secret));
    let mut out = [0u8; SECRET_CIPHER_LEN];
    for (o, (p, m)) in out.iter_mut().zip(payload.iter().zip(mask.iter())) {
        *o = p ^ m;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_format() {
        let pair = EcdhKeyPair::generate();
        let cert = pair.public_key_certificate();
        assert_eq!(cert.len(), CERTIFICATE_LEN);
        assert_eq!(cert[0], 0x04);
    }

    #[test]
    fn test_shared_secret_symmetry() {
        let a = EcdhKeyPair::generate();
        let b = EcdhKeyPair::generate();

        let ab = a.compute_shared_secret(b.public_key_certificate()).unwrap();
        let ba = b.compute_shared_secret(a.public_key_certificate()).unwrap();
        assert_eq!(*ab, *ba);
        assert_eq!(ab.len(), 32);
    }

    #[test]
    fn test_restored_pair_matches() {
        let private = [0x42u8; 32];
        let a = EcdhKeyPair::from_private(&private).unwrap();
        let b = EcdhKeyPair::from_private(&private).unwrap();
        assert_eq!(a.public_key_certificate(), b.public_key_certificate());
        assert_eq!(
            EcdhKeyPair::from_private(&[0u8; 32]).unwrap_err(),
            KeyExchangeError::InvalidPrivateKey
        );
    }

    #[test]
    fn test_rejects_bad_certificates() {
        let pair = EcdhKeyPair::generate();
        assert!(pair.compute_shared_secret(&[0x04; 10]).is_err());

        let mut compressed_marker = pair.public_key_certificate().to_vec();
        compressed_marker[0] = 0x02;
        assert!(pair.compute_shared_secret(&compressed_marker).is_err());

        let mut off_curve = pair.public_key_certificate().to_vec();
        off_curve[64] ^= 0x01;
        assert!(pair.compute_shared_secret(&off_curve).is_err());
    }

    #[test]
    fn test_secret_cipher_is_involution() {
        let secret = b"shared secret bytes";
        let payload = md5(b"new password");
        let ciphered = cipher_with_secret(secret, &payload).unwrap();
        assert_ne!(ciphered, payload);
        assert_eq!(cipher_with_secret(secret, &ciphered).unwrap(), payload);
    }

    #[test]
    fn test_secret_cipher_length() {
        assert_eq!(
            cipher_with_secret(b"s", &[0u8; 15]),
            Err(KeyExchangeError::PayloadLength(15))
        );
    }
}
