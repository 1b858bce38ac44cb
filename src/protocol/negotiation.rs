//! ECDH password negotiation.
//!
//! Rotates a device's working password without sending it in clear. The
//! registration password (`shared_key`) only authenticates the exchange.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use zeroize::Zeroizing;

use super::session::Session;
use super::{NONCE_BYTES, SERVER_ID};
use crate::codec::crypto::checksum::verify;
use crate::codec::crypto::{
    cipher_with_secret, generate_nonce, hmac, hmac_from_digest, md5, CryptoError, EcdhKeyPair,
    HmacType,
};
use crate::codec::pdu::{Envelope, Header, HeaderKey, StatusCode};
use crate::store::SecurityStore;

/// Negotiation progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// No negotiation in progress
    None,
    /// Server key sent, waiting for the device key
    WaitPubKey,
    /// Ciphered password sent, waiting for the acknowledgement
    WaitAck,
    /// Password rotated
    Done,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::WaitPubKey => "WAIT_PUB_KEY",
            Self::WaitAck => "WAIT_ACK",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Negotiation failure. The session state is left untouched.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("device {comm_id} does not need a password negotiation")]
    NotRequired { comm_id: String },

    #[error("unexpected message in negotiation state {state}")]
    UnexpectedMessage { state: NegotiationState },

    #[error("missing header {key} in negotiation state {state}")]
    MissingHeader {
        state: NegotiationState,
        key: HeaderKey,
    },

    #[error("checksum verification failed in negotiation state {state}")]
    VerificationFailed { state: NegotiationState },

    #[error("negotiation material lost in state {state}")]
    Inconsistent { state: NegotiationState },

    #[error("negotiation crypto failure: {0}")]
    Crypto(#[from] CryptoError),
}

/// Source of new working passwords.
pub type PasswordGenerator = Arc<dyn Fn() -> String + Send + Sync>;

const NEGOTIATION_HEADERS: [HeaderKey; 4] = [
    HeaderKey::AutoregSalt,
    HeaderKey::AutoregPubkey,
    HeaderKey::AutoregCtext,
    HeaderKey::AutoregMac,
];

/// Drives the negotiation state machine of a session.
pub struct NegotiationHandler {
    store: Arc<dyn SecurityStore>,
    password_generator: PasswordGenerator,
}

impl NegotiationHandler {
    /// Handler generating random 32-character passwords.
    pub fn new(store: Arc<dyn SecurityStore>) -> Self {
        Self {
            store,
            password_generator: Arc::new(|| generate_nonce(16)),
        }
    }

    pub fn with_password_generator(
        mut self,
        generator: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.password_generator = Arc::new(generator);
        self
    }

    /// Advance the negotiation with `envelope`.
    ///
    /// Returns the envelope to send back, or `None` once the new password
    /// is committed.
    pub fn handle(
        &self,
        envelope: &Envelope,
        session: &mut Session,
    ) -> Result<Option<Envelope>, NegotiationError> {
        let state = session.negotiation;
        tracing::debug!(comm_id = %session.comm_id(), %state, "password negotiation step");
        match state {
            NegotiationState::None => self.start(envelope, session).map(Some),
            NegotiationState::WaitPubKey => self.on_public_key(envelope, session).map(Some),
            NegotiationState::WaitAck => self.on_ack(envelope, session).map(|()| None),
            NegotiationState::Done => Err(NegotiationError::UnexpectedMessage { state }),
        }
    }

    fn start(&self, envelope: &Envelope, session: &mut Session) -> Result<Envelope, NegotiationError> {
        let state = NegotiationState::None;
        if !session.needs_negotiation() {
            return Err(NegotiationError::NotRequired {
                comm_id: session.comm_id().to_string(),
            });
        }
        if NEGOTIATION_HEADERS.iter().any(|k| envelope.header.contains(k)) {
            return Err(NegotiationError::UnexpectedMessage { state });
        }

        let key_pair = EcdhKeyPair::generate();
        let salt = generate_nonce(NONCE_BYTES).into_bytes();
        let header = Header::new()
            .with(HeaderKey::Status, StatusCode::AuthenticationRequired)
            .with(HeaderKey::AutoregSalt, salt.clone())
            .with(HeaderKey::AutoregPubkey, key_pair.public_key_certificate().to_vec());

        let data = &mut session.negotiation_data;
        data.key_pair = Some(key_pair);
        data.server_salt = Some(salt);
        session.negotiation = NegotiationState::WaitPubKey;
        tracing::info!(comm_id = %session.comm_id(), "password negotiation started");
        Ok(Envelope::new(header, Vec::new()))
    }

    fn on_public_key(
        &self,
        envelope: &Envelope,
        session: &mut Session,
    ) -> Result<Envelope, NegotiationError> {
        let state = NegotiationState::WaitPubKey;
        let header = &envelope.header;
        let public_key = required(header, HeaderKey::AutoregPubkey, state)?;
        let device_salt = required(header, HeaderKey::AutoregSalt, state)?;

        let data = &session.negotiation_data;
        let (Some(key_pair), Some(server_salt)) = (&data.key_pair, &data.server_salt) else {
            return Err(NegotiationError::Inconsistent { state });
        };

        let shared_key = session.security.shared_key.clone().unwrap_or_default();
        if !shared_key.is_empty() {
            let mac = required(header, HeaderKey::AutoregMac, state)?;
            let expected = hmac(
                HmacType::Md5,
                session.comm_id().as_bytes(),
                shared_key.as_bytes(),
                server_salt,
                public_key,
            );
            verify(&expected, mac).map_err(|_| NegotiationError::VerificationFailed { state })?;
        }

        let secret = key_pair
            .compute_shared_secret(public_key)
            .map_err(CryptoError::from)?;
        let new_password = Zeroizing::new((self.password_generator)());
        let password_digest = Zeroizing::new(md5(new_password.as_bytes()));
        let ctext = cipher_with_secret(&secret, password_digest.as_slice())
            .map_err(CryptoError::from)?;
        let ack_salt = generate_nonce(NONCE_BYTES).into_bytes();
        let mac = hmac(
            HmacType::Md5,
            SERVER_ID.as_bytes(),
            shared_key.as_bytes(),
            device_salt,
            &ctext,
        );

        let reply = Header::new()
            .with(HeaderKey::Status, StatusCode::AuthenticationRequired)
            .with(HeaderKey::AutoregCtext, ctext.to_vec())
            .with(HeaderKey::AutoregSalt, ack_salt.clone())
            .with(HeaderKey::AutoregMac, mac);

        let data = &mut session.negotiation_data;
        data.key_pair = None;
        data.shared_secret = Some(secret);
        data.new_password = Some(new_password);
        data.ack_salt = Some(ack_salt);
        session.negotiation = NegotiationState::WaitAck;
        Ok(Envelope::new(reply, Vec::new()))
    }

    fn on_ack(&self, envelope: &Envelope, session: &mut Session) -> Result<(), NegotiationError> {
        let state = NegotiationState::WaitAck;
        let mac = required(&envelope.header, HeaderKey::AutoregMac, state)?;

        let data = &session.negotiation_data;
        let (Some(secret), Some(new_password), Some(ack_salt)) =
            (&data.shared_secret, &data.new_password, &data.ack_salt)
        else {
            return Err(NegotiationError::Inconsistent { state });
        };
        let kind = session
            .security
            .authentication
            .hmac_type()
            .ok_or_else(|| NegotiationError::NotRequired {
                comm_id: session.comm_id().to_string(),
            })?;

        let expected = hmac_from_digest(
            kind,
            session.comm_id().as_bytes(),
            &md5(new_password.as_bytes()),
            ack_salt,
            secret,
        );
        verify(&expected, mac).map_err(|_| NegotiationError::VerificationFailed { state })?;

        let password = new_password.as_str().to_owned();
        self.store.store_new_password(session.comm_id(), &password);
        session.security.credential = Some(password);
        session.reset_negotiation();
        session.negotiation = NegotiationState::Done;
        session.auth_attempts = 0;
        tracing::info!(comm_id = %session.comm_id(), "password negotiation done");
        Ok(())
    }
}

fn required(
    header: &Header,
    key: HeaderKey,
    state: NegotiationState,
) -> Result<&[u8], NegotiationError> {
    match header.get_bytes(&key) {
        Some(bytes) => Ok(bytes),
        None => Err(NegotiationError::MissingHeader { state, key }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Authentication, DeviceNegotiation, Encryption, SecurityInfo};
    use crate::store::InMemoryStore;

    fn setup() -> (Arc<InMemoryStore>, NegotiationHandler, Session) {
        let store = Arc::new(InMemoryStore::new(10));
        let info = SecurityInfo::registered("dev", Authentication::HmacMd5, Encryption::None, "reg");
        store.add_security_info(info.clone());
        let handler =
            NegotiationHandler::new(store.clone()).with_password_generator(|| "fresh-pw".to_string());
        (store, handler, Session::new("dev", info))
    }

    fn hello() -> Envelope {
        Envelope::new(Header::new().with(HeaderKey::Id, "dev"), Vec::new())
    }

    #[test]
    fn test_full_exchange() {
        let (store, handler, mut session) = setup();
        let mut device = DeviceNegotiation::new("dev", Authentication::HmacMd5, "reg");

        let challenge = handler.handle(&hello(), &mut session).unwrap().unwrap();
        assert_eq!(challenge.status(), Some(StatusCode::AuthenticationRequired));
        assert_eq!(session.negotiation_state(), NegotiationState::WaitPubKey);

        let public_key = device.on_challenge(&challenge).unwrap();
        let ctext = handler.handle(&public_key, &mut session).unwrap().unwrap();
        assert_eq!(session.negotiation_state(), NegotiationState::WaitAck);
        assert!(store.security_info("dev").unwrap().credential.is_none());

        let (ack, digest) = device.on_ciphered_password(&ctext).unwrap();
        assert_eq!(*digest, md5(b"fresh-pw"));
        assert!(handler.handle(&ack, &mut session).unwrap().is_none());

        assert_eq!(session.negotiation_state(), NegotiationState::Done);
        assert_eq!(session.security().credential(), Some("fresh-pw"));
        assert_eq!(store.security_info("dev").unwrap().credential(), Some("fresh-pw"));
    }

    #[test]
    fn test_done_rejects_messages() {
        let (_store, handler, mut session) = setup();
        session.negotiation = NegotiationState::Done;
        let err = handler.handle(&hello(), &mut session).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::UnexpectedMessage { state: NegotiationState::Done }
        ));
        assert_eq!(session.negotiation_state(), NegotiationState::Done);
    }

    #[test]
    fn test_out_of_sequence_message() {
        let (_store, handler, mut session) = setup();
        let early_ack = Envelope::new(
            Header::new().with(HeaderKey::AutoregMac, vec![0u8; 16]),
            Vec::new(),
        );
        let err = handler.handle(&early_ack, &mut session).unwrap_err();
        assert!(matches!(err, NegotiationError::UnexpectedMessage { .. }));
        assert_eq!(session.negotiation_state(), NegotiationState::None);

        handler.handle(&hello(), &mut session).unwrap();
        let err = handler.handle(&hello(), &mut session).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::MissingHeader { key: HeaderKey::AutoregPubkey, .. }
        ));
        assert_eq!(session.negotiation_state(), NegotiationState::WaitPubKey);
    }

    #[test]
    fn test_wrong_registration_password() {
        let (_store, handler, mut session) = setup();
        let mut device = DeviceNegotiation::new("dev", Authentication::HmacMd5, "not-reg");

        let challenge = handler.handle(&hello(), &mut session).unwrap().unwrap();
        let public_key = device.on_challenge(&challenge).unwrap();
        let err = handler.handle(&public_key, &mut session).unwrap_err();
        assert!(matches!(err, NegotiationError::VerificationFailed { .. }));
        assert_eq!(session.negotiation_state(), NegotiationState::WaitPubKey);
    }

    #[test]
    fn test_bad_ack_keeps_state() {
        let (store, handler, mut session) = setup();
        let mut device = DeviceNegotiation::new("dev", Authentication::HmacMd5, "reg");

        let challenge = handler.handle(&hello(), &mut session).unwrap().unwrap();
        let public_key = device.on_challenge(&challenge).unwrap();
        handler.handle(&public_key, &mut session).unwrap();

        let forged = Envelope::new(
            Header::new().with(HeaderKey::AutoregMac, vec![0u8; 16]),
            Vec::new(),
        );
        let err = handler.handle(&forged, &mut session).unwrap_err();
        assert!(matches!(err, NegotiationError::VerificationFailed { .. }));
        assert_eq!(session.negotiation_state(), NegotiationState::WaitAck);
        assert!(store.security_info("dev").unwrap().credential.is_none());
    }

    #[test]
    fn test_not_required_for_open_device() {
        let (_store, handler, _) = setup();
        let mut session = Session::unsecured("open");
        let err = handler.handle(&hello(), &mut session).unwrap_err();
        assert!(matches!(err, NegotiationError::NotRequired { .. }));
    }
}
