//! Authentication of device envelopes and signing of server responses.

use std::sync::Arc;

use thiserror::Error;

use super::session::Session;
use super::{status_envelope, DEFAULT_MAX_AUTH_ATTEMPTS, NONCE_BYTES, SERVER_ID};
use crate::codec::crypto::checksum::verify;
use crate::codec::crypto::{
    cipher_bytes, generate_nonce, hmac, CipherError, CipherMode, HmacType,
};
use crate::codec::pdu::{Envelope, Header, HeaderKey, StatusCode};
use crate::store::SecurityStore;

/// Outcome of [`SecurityHandler::authenticate`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthenticationResult {
    /// Envelope authenticated; `payload` is in clear
    Success { payload: Vec<u8> },
    /// The device challenged the server; `response` is the last response
    /// in clear, to be signed again and resent
    Replay { response: Envelope },
    /// Authentication failed; `response` goes back to the device
    Failure {
        response: Envelope,
        end_session: bool,
    },
}

/// Errors that prevent a security decision.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("device {comm_id} has no credential, password negotiation required")]
    NegotiationRequired { comm_id: String },

    #[error("response cipher failed: {0}")]
    Cipher(#[from] CipherError),
}

/// Verifies device envelopes and signs server responses.
///
/// Holds no session state; everything it learns goes to the [`Session`]
/// and the [`SecurityStore`].
pub struct SecurityHandler {
    store: Arc<dyn SecurityStore>,
    max_attempts: u32,
}

impl SecurityHandler {
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
        }
    }

    /// Set how many failed authentications end the session.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Authenticate `envelope` against the session's profile.
    ///
    /// Fails with [`SecurityError::NegotiationRequired`] when the profile
    /// asks for authentication but holds no credential yet.
    pub fn authenticate(
        &self,
        envelope: &Envelope,
        session: &mut Session,
    ) -> Result<AuthenticationResult, SecurityError> {
        session.peer_nonce = None;

        let Some(kind) = session.security.authentication.hmac_type() else {
            return Ok(AuthenticationResult::Success {
                payload: envelope.payload.clone(),
            });
        };
        let Some(credential) = session.security.credential().map(str::to_owned) else {
            return Err(SecurityError::NegotiationRequired {
                comm_id: session.comm_id().to_string(),
            });
        };

        let device_nonce = envelope.header.get_bytes(&HeaderKey::Nonce).map(<[u8]>::to_vec);

        if envelope.header.contains(&HeaderKey::Challenge) {
            if let (Some(last), Some(nonce)) = (session.last_server_response.clone(), &device_nonce) {
                tracing::info!(comm_id = %session.comm_id(), "device challenged the server, replaying last response");
                session.peer_nonce = Some(nonce.clone());
                return Ok(AuthenticationResult::Replay { response: last });
            }
        }

        let Some(mac) = envelope.header.get_bytes(&HeaderKey::Mac) else {
            tracing::debug!(comm_id = %session.comm_id(), "envelope without mac");
            return Ok(self.challenge(kind, session));
        };

        let server_nonce = session.security.nonce.clone();
        let expected = hmac(
            kind,
            session.comm_id().as_bytes(),
            credential.as_bytes(),
            server_nonce.as_bytes(),
            &envelope.payload,
        );
        if verify(&expected, mac).is_err() {
            tracing::warn!(comm_id = %session.comm_id(), attempt = session.auth_attempts + 1, "mac mismatch");
            return Ok(self.challenge(kind, session));
        }

        let payload = match session.security.encryption.algorithm() {
            Some(algorithm) => match cipher_bytes(
                CipherMode::Decryption,
                algorithm,
                credential.as_bytes(),
                server_nonce.as_bytes(),
                &envelope.payload,
            ) {
                Ok(clear) => clear,
                Err(e) => {
                    tracing::warn!(comm_id = %session.comm_id(), error = %e, "cannot decipher authenticated payload");
                    return Ok(AuthenticationResult::Failure {
                        response: status_envelope(StatusCode::BadRequest),
                        end_session: true,
                    });
                }
            },
            None => envelope.payload.clone(),
        };

        session.auth_attempts = 0;
        session.peer_nonce = device_nonce;
        Ok(AuthenticationResult::Success { payload })
    }

    /// Cipher and sign a response in clear.
    ///
    /// Only responses to an authenticated request are signed: without the
    /// device's nonce the envelope goes out as is. Signing issues and
    /// persists a fresh server nonce.
    pub fn sign_response(
        &self,
        envelope: Envelope,
        session: &mut Session,
    ) -> Result<Envelope, SecurityError> {
        let Some(kind) = session.security.authentication.hmac_type() else {
            return Ok(envelope);
        };
        let Some(credential) = session.security.credential().map(str::to_owned) else {
            return Ok(envelope);
        };
        let Some(peer_nonce) = session.peer_nonce.take() else {
            return Ok(envelope);
        };

        session.last_server_response = Some(envelope.clone());

        let mut signed = envelope;
        if let Some(algorithm) = session.security.encryption.algorithm() {
            signed.payload = cipher_bytes(
                CipherMode::Encryption,
                algorithm,
                credential.as_bytes(),
                &peer_nonce,
                &signed.payload,
            )?;
        }

        let nonce = self.renew_nonce(session);
        let mac = hmac(
            kind,
            SERVER_ID.as_bytes(),
            credential.as_bytes(),
            &peer_nonce,
            &signed.payload,
        );
        signed.header.insert(HeaderKey::Nonce, nonce.into_bytes());
        signed.header.insert(HeaderKey::Mac, mac);
        Ok(signed)
    }

    fn challenge(&self, kind: HmacType, session: &mut Session) -> AuthenticationResult {
        session.auth_attempts += 1;
        if session.auth_attempts >= self.max_attempts {
            tracing::warn!(
                comm_id = %session.comm_id(),
                attempts = session.auth_attempts,
                "too many authentication failures, closing"
            );
            return AuthenticationResult::Failure {
                response: status_envelope(StatusCode::Forbidden),
                end_session: true,
            };
        }

        let nonce = self.renew_nonce(session);
        let header = Header::new()
            .with(HeaderKey::Status, StatusCode::Unauthorized)
            .with(HeaderKey::Challenge, kind.name())
            .with(HeaderKey::Nonce, nonce.into_bytes());
        AuthenticationResult::Failure {
            response: Envelope::new(header, Vec::new()),
            end_session: false,
        }
    }

    fn renew_nonce(&self, session: &mut Session) -> String {
        let nonce = generate_nonce(NONCE_BYTES);
        self.store.store_nonce(session.comm_id(), &nonce);
        session.security.nonce = nonce.clone();
        nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::crypto::CipherAlgorithm;
    use crate::protocol::{Authentication, Encryption, SecurityInfo};
    use crate::store::InMemoryStore;

    fn setup(encryption: Encryption) -> (Arc<InMemoryStore>, SecurityHandler, Session) {
        let store = Arc::new(InMemoryStore::new(10));
        let info = SecurityInfo::registered("dev", Authentication::HmacSha1, encryption, "reg")
            .with_credential("secret");
        store.add_security_info(info.clone());
        let handler = SecurityHandler::new(store.clone());
        (store, handler, Session::new("dev", info))
    }

    fn signed_request(session: &Session, payload: &[u8]) -> Envelope {
        let mac = hmac(
            HmacType::Sha1,
            b"dev",
            b"secret",
            session.security().nonce.as_bytes(),
            payload,
        );
        let header = Header::new()
            .with(HeaderKey::Id, "dev")
            .with(HeaderKey::Nonce, b"device-nonce".to_vec())
            .with(HeaderKey::Mac, mac);
        Envelope::new(header, payload.to_vec())
    }

    #[test]
    fn test_unsecured_passes_through() {
        let store = Arc::new(InMemoryStore::new(10));
        let handler = SecurityHandler::new(store);
        let mut session = Session::unsecured("dev");
        let envelope = Envelope::new(Header::new(), b"data".to_vec());

        let result = handler.authenticate(&envelope, &mut session).unwrap();
        assert_eq!(result, AuthenticationResult::Success { payload: b"data".to_vec() });
        assert_eq!(handler.sign_response(envelope.clone(), &mut session).unwrap(), envelope);
    }

    #[test]
    fn test_valid_mac_accepted_and_response_signed() {
        let (store, handler, mut session) = setup(Encryption::None);
        let request = signed_request(&session, b"body");

        let result = handler.authenticate(&request, &mut session).unwrap();
        assert_eq!(result, AuthenticationResult::Success { payload: b"body".to_vec() });

        let response = status_envelope(StatusCode::Ok);
        let signed = handler.sign_response(response, &mut session).unwrap();
        let new_nonce = signed.header.get_text(&HeaderKey::Nonce).unwrap().to_string();
        assert_eq!(store.security_info("dev").unwrap().nonce, new_nonce);
        assert_eq!(
            signed.header.get_bytes(&HeaderKey::Mac).unwrap(),
            hmac(HmacType::Sha1, SERVER_ID.as_bytes(), b"secret", b"device-nonce", &[]).as_slice()
        );
        assert!(session.last_server_response().is_some());
    }

    #[test]
    fn test_missing_mac_is_challenged_then_forbidden() {
        let (store, handler, mut session) = setup(Encryption::None);
        let bare = Envelope::new(Header::new().with(HeaderKey::Id, "dev"), b"x".to_vec());

        for attempt in 1..DEFAULT_MAX_AUTH_ATTEMPTS {
            let AuthenticationResult::Failure { response, end_session } =
                handler.authenticate(&bare, &mut session).unwrap()
            else {
                panic!("expected failure");
            };
            assert!(!end_session);
            assert_eq!(response.status(), Some(StatusCode::Unauthorized));
            assert_eq!(response.header.get_text(&HeaderKey::Challenge), Some("hmac-sha1"));
            assert_eq!(
                response.header.get_text(&HeaderKey::Nonce),
                Some(store.security_info("dev").unwrap().nonce.as_str())
            );
            assert_eq!(session.auth_attempts(), attempt);
        }

        let AuthenticationResult::Failure { response, end_session } =
            handler.authenticate(&bare, &mut session).unwrap()
        else {
            panic!("expected failure");
        };
        assert!(end_session);
        assert_eq!(response.status(), Some(StatusCode::Forbidden));
    }

    #[test]
    fn test_success_resets_attempts() {
        let (_store, handler, mut session) = setup(Encryption::None);
        let mut tampered = signed_request(&session, b"body");
        tampered.payload = b"evil".to_vec();
        handler.authenticate(&tampered, &mut session).unwrap();
        assert_eq!(session.auth_attempts(), 1);

        let request = signed_request(&session, b"body");
        let result = handler.authenticate(&request, &mut session).unwrap();
        assert!(matches!(result, AuthenticationResult::Success { .. }));
        assert_eq!(session.auth_attempts(), 0);
    }

    #[test]
    fn test_ciphered_payload() {
        let (_store, handler, mut session) = setup(Encryption::AesCbc128);
        let ciphered = cipher_bytes(
            CipherMode::Encryption,
            CipherAlgorithm::AesCbc128,
            b"secret",
            session.security().nonce.as_bytes(),
            b"clear text",
        )
        .unwrap();
        let request = signed_request(&session, &ciphered);

        let result = handler.authenticate(&request, &mut session).unwrap();
        assert_eq!(result, AuthenticationResult::Success { payload: b"clear text".to_vec() });

        let response = Envelope::new(Header::new(), b"reply".to_vec());
        let signed = handler.sign_response(response, &mut session).unwrap();
        let clear = cipher_bytes(
            CipherMode::Decryption,
            CipherAlgorithm::AesCbc128,
            b"secret",
            b"device-nonce",
            &signed.payload,
        )
        .unwrap();
        assert_eq!(clear, b"reply");
    }

    #[test]
    fn test_device_challenge_replays_last_response() {
        let (_store, handler, mut session) = setup(Encryption::None);
        let request = signed_request(&session, b"body");
        handler.authenticate(&request, &mut session).unwrap();
        let response = Envelope::new(Header::new().with(HeaderKey::Status, StatusCode::Ok), b"r".to_vec());
        handler.sign_response(response.clone(), &mut session).unwrap();

        let challenge = Envelope::new(
            Header::new()
                .with(HeaderKey::Id, "dev")
                .with(HeaderKey::Challenge, "hmac-sha1")
                .with(HeaderKey::Nonce, b"other-nonce".to_vec()),
            Vec::new(),
        );
        let result = handler.authenticate(&challenge, &mut session).unwrap();
        assert_eq!(result, AuthenticationResult::Replay { response: response.clone() });

        let resigned = handler.sign_response(response, &mut session).unwrap();
        assert_eq!(
            resigned.header.get_bytes(&HeaderKey::Mac).unwrap(),
            hmac(HmacType::Sha1, SERVER_ID.as_bytes(), b"secret", b"other-nonce", b"r").as_slice()
        );
    }

    #[test]
    fn test_negotiation_required() {
        let store = Arc::new(InMemoryStore::new(10));
        let handler = SecurityHandler::new(store);
        let info = SecurityInfo::registered("dev", Authentication::HmacMd5, Encryption::None, "reg");
        let mut session = Session::new("dev", info);

        let err = handler
            .authenticate(&Envelope::default(), &mut session)
            .unwrap_err();
        assert!(matches!(err, SecurityError::NegotiationRequired { .. }));
    }
}
