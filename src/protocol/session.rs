//! Per-connection session state.

use zeroize::Zeroizing;

use super::negotiation::NegotiationState;
use super::profile::SecurityInfo;
use crate::codec::crypto::EcdhKeyPair;
use crate::codec::pdu::Envelope;

/// Material kept between the rounds of a password negotiation.
#[derive(Default)]
pub(crate) struct NegotiationData {
    pub key_pair: Option<EcdhKeyPair>,
    /// Salt the server sent with its public key
    pub server_salt: Option<Vec<u8>>,
    /// Salt the server sent with the ciphered password
    pub ack_salt: Option<Vec<u8>>,
    pub shared_secret: Option<Zeroizing<Vec<u8>>>,
    pub new_password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for NegotiationData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationData")
            .field("key_pair", &self.key_pair)
            .field("server_salt", &self.server_salt)
            .field("ack_salt", &self.ack_salt)
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "[REDACTED]"))
            .field("new_password", &self.new_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// State of one device connection.
///
/// Created on the first envelope carrying a communication id and dropped
/// with the connection. Never shared.
#[derive(Debug)]
pub struct Session {
    comm_id: String,
    pub(crate) security: SecurityInfo,
    /// Last response in clear, replayed when the device challenges us
    pub(crate) last_server_response: Option<Envelope>,
    /// Nonce the device sent with its last authenticated request
    pub(crate) peer_nonce: Option<Vec<u8>>,
    pub(crate) auth_attempts: u32,
    pub(crate) negotiation: NegotiationState,
    pub(crate) negotiation_data: NegotiationData,
}

impl Session {
    /// Session for `comm_id` using its stored profile.
    pub fn new(comm_id: impl Into<String>, security: SecurityInfo) -> Self {
        Self {
            comm_id: comm_id.into(),
            security,
            last_server_response: None,
            peer_nonce: None,
            auth_attempts: 0,
            negotiation: NegotiationState::None,
            negotiation_data: NegotiationData::default(),
        }
    }

    /// Session of a device without a registered profile.
    pub fn unsecured(comm_id: impl Into<String>) -> Self {
        let comm_id = comm_id.into();
        let security = SecurityInfo::unsecured(comm_id.clone());
        Self::new(comm_id, security)
    }

    pub fn comm_id(&self) -> &str {
        &self.comm_id
    }

    pub fn security(&self) -> &SecurityInfo {
        &self.security
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiation
    }

    pub fn auth_attempts(&self) -> u32 {
        self.auth_attempts
    }

    pub fn last_server_response(&self) -> Option<&Envelope> {
        self.last_server_response.as_ref()
    }

    /// Whether the device must negotiate a password before sending data.
    pub fn needs_negotiation(&self) -> bool {
        self.security.needs_negotiation()
    }

    /// Forget any negotiation in progress and start over from `None`.
    pub fn reset_negotiation(&mut self) {
        if self.negotiation != NegotiationState::None {
            tracing::debug!(comm_id = %self.comm_id, from = ?self.negotiation, "negotiation reset");
        }
        self.negotiation = NegotiationState::None;
        self.negotiation_data = NegotiationData::default();
    }
}
