//! Device side of the security layer.
//!
//! A device only ever holds `MD5(password)`: password negotiation hands it
//! the digest, and both the checksum and the cipher key schedule start from
//! it.

use thiserror::Error;
use zeroize::Zeroizing;

use super::profile::{Authentication, Encryption};
use super::{NONCE_BYTES, SERVER_ID};
use crate::codec::crypto::checksum::verify;
use crate::codec::crypto::cipher::cipher_with_key;
use crate::codec::crypto::{
    cipher_with_secret, generate_nonce, hmac, hmac_from_digest, md5, CipherMode, CryptoError,
    EcdhKeyPair, HmacType, KeyIv,
};
use crate::codec::pdu::{Envelope, Header, HeaderKey};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("missing header {0}")]
    MissingHeader(HeaderKey),

    #[error("server checksum verification failed")]
    VerificationFailed,

    #[error("no password negotiation in progress")]
    NoNegotiation,

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

/// Credentials a device signs its requests with.
#[derive(Clone)]
pub struct DeviceCredentials {
    comm_id: String,
    authentication: Authentication,
    encryption: Encryption,
    password_md5: Zeroizing<[u8; 16]>,
}

impl DeviceCredentials {
    pub fn new(
        comm_id: impl Into<String>,
        authentication: Authentication,
        encryption: Encryption,
        password: &str,
    ) -> Self {
        Self::from_digest(comm_id, authentication, encryption, md5(password.as_bytes()))
    }

    /// Credentials from `MD5(password)`, as obtained by negotiation.
    pub fn from_digest(
        comm_id: impl Into<String>,
        authentication: Authentication,
        encryption: Encryption,
        password_md5: [u8; 16],
    ) -> Self {
        Self {
            comm_id: comm_id.into(),
            authentication,
            encryption,
            password_md5: Zeroizing::new(password_md5),
        }
    }

    pub fn comm_id(&self) -> &str {
        &self.comm_id
    }

    /// Add `id`, `nonce` and `mac` to a request, ciphering its payload if
    /// configured. Returns the request and the device nonce the response
    /// will be signed with.
    pub fn sign_request(
        &self,
        mut envelope: Envelope,
        server_nonce: &[u8],
    ) -> Result<(Envelope, Vec<u8>), DeviceError> {
        envelope.header.insert(HeaderKey::Id, self.comm_id.as_str());
        let Some(kind) = self.authentication.hmac_type() else {
            return Ok((envelope, Vec::new()));
        };

        let nonce = generate_nonce(NONCE_BYTES).into_bytes();
        envelope.payload = self.cipher(CipherMode::Encryption, server_nonce, &envelope.payload)?;
        let mac = hmac_from_digest(
            kind,
            self.comm_id.as_bytes(),
            self.password_md5.as_slice(),
            server_nonce,
            &envelope.payload,
        );
        envelope.header.insert(HeaderKey::Nonce, nonce.clone());
        envelope.header.insert(HeaderKey::Mac, mac);
        Ok((envelope, nonce))
    }

    /// Check a server response to a request signed with `device_nonce` and
    /// return its payload in clear.
    pub fn open_response(
        &self,
        envelope: &Envelope,
        device_nonce: &[u8],
    ) -> Result<Vec<u8>, DeviceError> {
        let Some(kind) = self.authentication.hmac_type() else {
            return Ok(envelope.payload.clone());
        };
        let mac = envelope
            .header
            .get_bytes(&HeaderKey::Mac)
            .ok_or(DeviceError::MissingHeader(HeaderKey::Mac))?;
        let expected = hmac_from_digest(
            kind,
            SERVER_ID.as_bytes(),
            self.password_md5.as_slice(),
            device_nonce,
            &envelope.payload,
        );
        verify(&expected, mac).map_err(|_| DeviceError::VerificationFailed)?;
        self.cipher(CipherMode::Decryption, device_nonce, &envelope.payload)
    }

    fn cipher(&self, mode: CipherMode, nonce: &[u8], data: &[u8]) -> Result<Vec<u8>, DeviceError> {
        let Some(algorithm) = self.encryption.algorithm() else {
            return Ok(data.to_vec());
        };
        let key_iv = KeyIv::derive_from_digest(algorithm, self.password_md5.as_slice(), nonce);
        let mut out = Vec::with_capacity(data.len() + 16);
        cipher_with_key(mode, algorithm, &key_iv, data, &mut out).map_err(CryptoError::from)?;
        Ok(out)
    }
}

impl std::fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("comm_id", &self.comm_id)
            .field("authentication", &self.authentication)
            .field("encryption", &self.encryption)
            .field("password_md5", &"[REDACTED]")
            .finish()
    }
}

/// Device half of the password negotiation.
pub struct DeviceNegotiation {
    comm_id: String,
    authentication: Authentication,
    registration_password: String,
    shared_secret: Option<Zeroizing<Vec<u8>>>,
    salt: Option<Vec<u8>>,
}

impl DeviceNegotiation {
    pub fn new(
        comm_id: impl Into<String>,
        authentication: Authentication,
        registration_password: impl Into<String>,
    ) -> Self {
        Self {
            comm_id: comm_id.into(),
            authentication,
            registration_password: registration_password.into(),
            shared_secret: None,
            salt: None,
        }
    }

    /// Answer the server's key with ours.
    pub fn on_challenge(&mut self, challenge: &Envelope) -> Result<Envelope, DeviceError> {
        let server_salt = header_bytes(&challenge.header, HeaderKey::AutoregSalt)?;
        let server_key = header_bytes(&challenge.header, HeaderKey::AutoregPubkey)?;

        let key_pair = EcdhKeyPair::generate();
        let secret = key_pair
            .compute_shared_secret(server_key)
            .map_err(CryptoError::from)?;
        let salt = generate_nonce(NONCE_BYTES).into_bytes();
        let mac = hmac(
            HmacType::Md5,
            self.comm_id.as_bytes(),
            self.registration_password.as_bytes(),
            server_salt,
            key_pair.public_key_certificate(),
        );

        let header = Header::new()
            .with(HeaderKey::Id, self.comm_id.as_str())
            .with(HeaderKey::AutoregPubkey, key_pair.public_key_certificate().to_vec())
            .with(HeaderKey::AutoregSalt, salt.clone())
            .with(HeaderKey::AutoregMac, mac);
        self.shared_secret = Some(secret);
        self.salt = Some(salt);
        Ok(Envelope::new(header, Vec::new()))
    }

    /// Recover the new password digest and build the acknowledgement.
    pub fn on_ciphered_password(
        &mut self,
        reply: &Envelope,
    ) -> Result<(Envelope, Zeroizing<[u8; 16]>), DeviceError> {
        let (Some(secret), Some(salt)) = (&self.shared_secret, &self.salt) else {
            return Err(DeviceError::NoNegotiation);
        };
        let kind = self.authentication.hmac_type().unwrap_or(HmacType::Md5);

        let ctext = header_bytes(&reply.header, HeaderKey::AutoregCtext)?;
        let ack_salt = header_bytes(&reply.header, HeaderKey::AutoregSalt)?;
        let mac = header_bytes(&reply.header, HeaderKey::AutoregMac)?;

        let expected = hmac(
            HmacType::Md5,
            SERVER_ID.as_bytes(),
            self.registration_password.as_bytes(),
            salt,
            ctext,
        );
        verify(&expected, mac).map_err(|_| DeviceError::VerificationFailed)?;

        let digest = Zeroizing::new(cipher_with_secret(secret, ctext).map_err(CryptoError::from)?);
        let ack_mac = hmac_from_digest(kind, self.comm_id.as_bytes(), digest.as_slice(), ack_salt, secret);
        let header = Header::new()
            .with(HeaderKey::Id, self.comm_id.as_str())
            .with(HeaderKey::AutoregMac, ack_mac);

        self.shared_secret = None;
        self.salt = None;
        Ok((Envelope::new(header, Vec::new()), digest))
    }
}

fn header_bytes(header: &Header, key: HeaderKey) -> Result<&[u8], DeviceError> {
    header.get_bytes(&key).ok_or(DeviceError::MissingHeader(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crypto::{cipher_bytes, CipherAlgorithm};

    #[test]
    fn test_sign_request_matches_clear_password_checksum() {
        let device = DeviceCredentials::new("dev", Authentication::HmacMd5, Encryption::None, "pw");
        let (request, nonce) = device
            .sign_request(Envelope::new(Header::new(), b"body".to_vec()), b"server-nonce")
            .unwrap();

        assert_eq!(request.comm_id(), Some("dev"));
        assert_eq!(request.header.get_bytes(&HeaderKey::Nonce), Some(nonce.as_slice()));
        assert_eq!(
            request.header.get_bytes(&HeaderKey::Mac).unwrap(),
            hmac(HmacType::Md5, b"dev", b"pw", b"server-nonce", b"body").as_slice()
        );
    }

    #[test]
    fn test_ciphered_request_matches_password_cipher() {
        let device =
            DeviceCredentials::new("dev", Authentication::HmacSha1, Encryption::AesCtr256, "pw");
        let (request, _) = device
            .sign_request(Envelope::new(Header::new(), b"body".to_vec()), b"n")
            .unwrap();
        let clear = cipher_bytes(
            CipherMode::Decryption,
            CipherAlgorithm::AesCtr256,
            b"pw",
            b"n",
            &request.payload,
        )
        .unwrap();
        assert_eq!(clear, b"body");
    }

    #[test]
    fn test_open_response_rejects_bad_mac() {
        let device = DeviceCredentials::new("dev", Authentication::HmacMd5, Encryption::None, "pw");
        let response = Envelope::new(
            Header::new().with(HeaderKey::Mac, vec![0u8; 16]),
            b"x".to_vec(),
        );
        assert!(matches!(
            device.open_response(&response, b"nonce"),
            Err(DeviceError::VerificationFailed)
        ));

        let mac = hmac(HmacType::Md5, SERVER_ID.as_bytes(), b"pw", b"nonce", b"x");
        let response = Envelope::new(Header::new().with(HeaderKey::Mac, mac), b"x".to_vec());
        assert_eq!(device.open_response(&response, b"nonce").unwrap(), b"x");
    }

    #[test]
    fn test_ack_without_challenge() {
        let mut device = DeviceNegotiation::new("dev", Authentication::HmacMd5, "reg");
        assert!(matches!(
            device.on_ciphered_password(&Envelope::default()),
            Err(DeviceError::NoNegotiation)
        ));
    }
}
