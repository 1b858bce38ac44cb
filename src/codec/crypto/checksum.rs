//! M3DA keyed checksum.
//!
//! ```text
//! K   = MD5(user || MD5(password))      inner hash is always MD5
//! mac = D(K || body || salt)            D is MD5 or SHA-1
//! ```
//!
//! This is not RFC 2104 HMAC: there is no ipad/opad. Peers compute exactly
//! this construction, so it must not be swapped for a textbook HMAC.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use sha1::Sha1;
use thiserror::Error;

/// Errors from checksum verification
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// Computed and provided checksums differ
    #[error("checksum verification failed")]
    VerificationFailed,

    /// Unknown authentication name
    #[error("unknown authentication kind: {0}")]
    UnknownKind(String),
}

/// Outer digest of the keyed checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmacType {
    /// `hmac-md5`
    Md5,
    /// `hmac-sha1`
    Sha1,
}

impl HmacType {
    /// Protocol name, as carried in `challenge` headers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "hmac-md5",
            Self::Sha1 => "hmac-sha1",
        }
    }

    /// Checksum length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }
}

impl fmt::Display for HmacType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HmacType {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hmac-md5" => Ok(Self::Md5),
            "hmac-sha1" => Ok(Self::Sha1),
            other => Err(ChecksumError::UnknownKind(other.to_string())),
        }
    }
}

/// Plain MD5 digest.
pub fn md5(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md5::digest(data));
    out
}

/// `K = MD5(user || MD5(password))`
pub fn checksum_key(user: &[u8], password: &[u8]) -> [u8; 16] {
    checksum_key_from_digest(user, &md5(password))
}

/// `K = MD5(user || password_md5)`, for holders of the password digest only.
pub fn checksum_key_from_digest(user: &[u8], password_md5: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(user);
    hasher.update(password_md5);
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// `D(key || body || salt)`
pub fn digest_with_key(kind: HmacType, key: &[u8], body: &[u8], salt: &[u8]) -> Vec<u8> {
    match kind {
        HmacType::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(key);
            hasher.update(body);
            hasher.update(salt);
            hasher.finalize().to_vec()
        }
        HmacType::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(key);
            hasher.update(body);
            hasher.update(salt);
            hasher.finalize().to_vec()
        }
    }
}

/// Keyed checksum from a clear password.
pub fn hmac(kind: HmacType, user: &[u8], password: &[u8], salt: &[u8], body: &[u8]) -> Vec<u8> {
    digest_with_key(kind, &checksum_key(user, password), body, salt)
}

/// Keyed checksum from `MD5(password)`.
pub fn hmac_from_digest(
    kind: HmacType,
    user: &[u8],
    password_md5: &[u8],
    salt: &[u8],
    body: &[u8],
) -> Vec<u8> {
    digest_with_key(kind, &checksum_key_from_digest(user, password_md5), body, salt)
}

/// Compare a received checksum against the expected one.
pub fn verify(expected: &[u8], provided: &[u8]) -> Result<(), ChecksumError> {
    if constant_time_eq(expected, provided) {
        Ok(())
    } else {
        Err(ChecksumError::VerificationFailed)
    }
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const SALT: [u8; 8] = hex!("1234567890ABCDEF");

    #[test]
    fn test_inner_key_is_md5_for_sha1() {
        assert_eq!(
            checksum_key(b"myUsername", b"myPassword"),
            hex!("4234f2270b88d6ed6a8aabd64fbdac6c")
        );
    }

    #[test]
    fn test_hmac_sha1_known_answer() {
        let mac = hmac(
            HmacType::Sha1,
            b"myUsername",
            b"myPassword",
            &SALT,
            b"the message body",
        );
        assert_eq!(mac, hex!("2a155084d567b3e3d903641c357978005ff4bb08"));
        assert_eq!(mac.len(), HmacType::Sha1.output_len());
    }

    #[test]
    fn test_hmac_md5_known_answer() {
        let mac = hmac(
            HmacType::Md5,
            b"myUsername",
            b"myPassword",
            &SALT,
            b"the message body",
        );
        assert_eq!(mac, hex!("f8242d544361ac08d3865f4e3c10d95d"));
    }

    #[test]
    fn test_outer_message_is_body_then_salt() {
        let key = checksum_key(b"myUsername", b"myPassword");
        let mut message = b"the message body".to_vec();
        message.extend_from_slice(&SALT);
        assert_eq!(
            message,
            hex!("746865206d65737361676520626f64791234567890abcdef")
        );

        let mut concatenated = key.to_vec();
        concatenated.extend_from_slice(&message);
        assert_eq!(
            digest_with_key(HmacType::Sha1, &key, b"the message body", &SALT),
            Sha1::digest(&concatenated).to_vec()
        );
    }

    #[test]
    fn test_digest_variant_matches_clear_password() {
        let from_clear = hmac(HmacType::Md5, b"dev", b"secret", b"salt", b"body");
        let from_digest = hmac_from_digest(HmacType::Md5, b"dev", &md5(b"secret"), b"salt", b"body");
        assert_eq!(from_clear, from_digest);
    }

    #[test]
    fn test_verify() {
        let mac = hmac(HmacType::Md5, b"u", b"p", b"s", b"b");
        assert!(verify(&mac, &mac).is_ok());
        assert_eq!(
            verify(&mac, &mac[..15]),
            Err(ChecksumError::VerificationFailed)
        );
        let mut tampered = mac.clone();
        tampered[0] ^= 1;
        assert_eq!(verify(&mac, &tampered), Err(ChecksumError::VerificationFailed));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("hmac-sha1".parse::<HmacType>(), Ok(HmacType::Sha1));
        assert_eq!("HMAC-MD5".parse::<HmacType>(), Ok(HmacType::Md5));
        assert!("hmac-sha256".parse::<HmacType>().is_err());
    }
}
