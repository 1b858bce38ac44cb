//! Protocol data units: envelopes, messages and responses.
//!
//! ```text
//! Envelope
//! ├── header   map   { "id": .., "status": .., "nonce": .., "mac": .. }
//! ├── payload  bytes (Bysant-encoded Messages, possibly ciphered)
//! └── footer   map
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::bysant::{encode_all, Map, Value};

/// Any PDU the codec can nest inside a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    /// Outermost framing unit
    Envelope(Envelope),
    /// Path-keyed data bundle
    Message(Message),
    /// Acknowledgement of a ticketed message
    Response(Response),
}

impl Pdu {
    /// Short variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Envelope(_) => "envelope",
            Self::Message(_) => "message",
            Self::Response(_) => "response",
        }
    }
}

impl From<Envelope> for Pdu {
    fn from(value: Envelope) -> Self {
        Self::Envelope(value)
    }
}

impl From<Message> for Pdu {
    fn from(value: Message) -> Self {
        Self::Message(value)
    }
}

impl From<Response> for Pdu {
    fn from(value: Response) -> Self {
        Self::Response(value)
    }
}

/// Envelope header key. Keys travel as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderKey {
    /// Communication id of the device
    Id,
    /// Response status code
    Status,
    /// Fresh salt issued by the sender
    Nonce,
    /// Keyed checksum over the payload
    Mac,
    /// Authentication challenge
    Challenge,
    /// Password negotiation salt
    AutoregSalt,
    /// Password negotiation public key
    AutoregPubkey,
    /// Password negotiation ciphered password digest
    AutoregCtext,
    /// Password negotiation checksum
    AutoregMac,
    /// Any key this implementation does not interpret
    Other(String),
}

impl HeaderKey {
    /// Wire name of the key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id => "id",
            Self::Status => "status",
            Self::Nonce => "nonce",
            Self::Mac => "mac",
            Self::Challenge => "challenge",
            Self::AutoregSalt => "autoreg_salt",
            Self::AutoregPubkey => "autoreg_pubkey",
            Self::AutoregCtext => "autoreg_ctext",
            Self::AutoregMac => "autoreg_mac",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for HeaderKey {
    fn from(name: &str) -> Self {
        match name {
            "id" => Self::Id,
            "status" => Self::Status,
            "nonce" => Self::Nonce,
            "mac" => Self::Mac,
            "challenge" => Self::Challenge,
            "autoreg_salt" => Self::AutoregSalt,
            "autoreg_pubkey" => Self::AutoregPubkey,
            "autoreg_ctext" => Self::AutoregCtext,
            "autoreg_mac" => Self::AutoregMac,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered envelope header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: Vec<(HeaderKey, Value)>,
}

impl Header {
    /// Empty header
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing any previous value in place.
    pub fn insert(&mut self, key: HeaderKey, value: impl Into<Value>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Header::insert`].
    pub fn with(mut self, key: HeaderKey, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &HeaderKey) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &HeaderKey) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, key: &HeaderKey) -> bool {
        self.get(key).is_some()
    }

    /// Raw bytes of a string or byte-string entry.
    pub fn get_bytes(&self, key: &HeaderKey) -> Option<&[u8]> {
        self.get(key).and_then(Value::as_bytes)
    }

    /// Text of a string or UTF-8 byte-string entry.
    pub fn get_text(&self, key: &HeaderKey) -> Option<&str> {
        self.get(key).and_then(Value::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderKey, Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(HeaderKey, Value)> for Header {
    fn from_iter<I: IntoIterator<Item = (HeaderKey, Value)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (key, value) in iter {
            header.insert(key, value);
        }
        header
    }
}

/// Outermost wire unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// Header map
    pub header: Header,
    /// Opaque payload, usually Bysant-encoded messages
    pub payload: Vec<u8>,
    /// Auxiliary map
    pub footer: Map,
}

impl Envelope {
    /// Envelope with the given header and payload and no footer.
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self {
            header,
            payload,
            footer: Map::new(),
        }
    }

    /// Envelope carrying `messages` as its payload.
    pub fn with_messages(header: Header, messages: &[Message]) -> Self {
        let values: Vec<Value> = messages
            .iter()
            .cloned()
            .map(|m| Value::from(Pdu::Message(m)))
            .collect();
        Self::new(header, encode_all(&values))
    }

    /// Envelope built around a bare message sent without framing.
    pub fn wrap_message(message: Message) -> Self {
        Self::with_messages(Header::new(), std::slice::from_ref(&message))
    }

    /// Communication id from the header.
    pub fn comm_id(&self) -> Option<&str> {
        self.header.get_text(&HeaderKey::Id)
    }

    /// Status code from the header, if present.
    pub fn status(&self) -> Option<StatusCode> {
        self.header
            .get(&HeaderKey::Status)
            .and_then(Value::as_int)
            .and_then(|code| u16::try_from(code).ok())
            .map(StatusCode::from)
    }
}

/// Path-keyed bundle of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Data path, e.g. `@sys.telemetry`
    pub path: String,
    /// Ticket id requesting an acknowledgement
    pub ticket_id: Option<u32>,
    /// Values by key
    pub body: BTreeMap<String, Value>,
}

impl Message {
    /// Message with an empty body.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ticket_id: None,
            body: BTreeMap::new(),
        }
    }

    /// Add a body entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Request an acknowledgement.
    pub fn with_ticket(mut self, ticket_id: u32) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }
}

/// Acknowledgement of a ticketed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ticket_id: u32,
    pub status: i64,
    pub message: String,
}

/// Status code carried in a response envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Unauthorized,
    Forbidden,
    AuthenticationRequired,
    EncryptionNeeded,
    UnexpectedError,
    ServiceUnavailable,
    /// Code outside the known set
    Unknown(u16),
}

impl StatusCode {
    /// Numeric code.
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::AuthenticationRequired => 407,
            Self::EncryptionNeeded => 450,
            Self::UnexpectedError => 500,
            Self::ServiceUnavailable => 503,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        match code {
            200 => Self::Ok,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            407 => Self::AuthenticationRequired,
            450 => Self::EncryptionNeeded,
            500 => Self::UnexpectedError,
            503 => Self::ServiceUnavailable,
            other => Self::Unknown(other),
        }
    }
}

impl From<StatusCode> for Value {
    fn from(status: StatusCode) -> Self {
        Value::Int(i64::from(status.code()))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::EncryptionNeeded => "ENCRYPTION_NEEDED",
            Self::UnexpectedError => "UNEXPECTED_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Unknown(_) => "UNKNOWN",
        };
        write!(f, "{} {}", self.code(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_insert_replaces_in_place() {
        let mut header = Header::new()
            .with(HeaderKey::Id, "dev-1")
            .with(HeaderKey::Nonce, b"abc".to_vec());
        header.insert(HeaderKey::Id, "dev-2");

        assert_eq!(header.len(), 2);
        assert_eq!(header.iter().next().map(|(k, _)| k), Some(&HeaderKey::Id));
        assert_eq!(header.get_text(&HeaderKey::Id), Some("dev-2"));
    }

    #[test]
    fn test_header_key_names() {
        for name in [
            "id",
            "status",
            "nonce",
            "mac",
            "challenge",
            "autoreg_salt",
            "autoreg_pubkey",
            "autoreg_ctext",
            "autoreg_mac",
            "x-custom",
        ] {
            assert_eq!(HeaderKey::from(name).as_str(), name);
        }
        assert_eq!(
            HeaderKey::from("x-custom"),
            HeaderKey::Other("x-custom".to_string())
        );
    }

    #[test]
    fn test_status_codes() {
        for code in [200, 400, 401, 403, 407, 450, 500, 503, 299] {
            assert_eq!(StatusCode::from(code).code(), code);
        }
        assert_eq!(StatusCode::from(299), StatusCode::Unknown(299));
        assert!(StatusCode::Ok.is_ok());
        assert_eq!(StatusCode::Forbidden.to_string(), "403 FORBIDDEN");
    }

    #[test]
    fn test_envelope_accessors() {
        let envelope = Envelope::new(
            Header::new()
                .with(HeaderKey::Id, b"dev-1".to_vec())
                .with(HeaderKey::Status, StatusCode::Unauthorized),
            Vec::new(),
        );
        assert_eq!(envelope.comm_id(), Some("dev-1"));
        assert_eq!(envelope.status(), Some(StatusCode::Unauthorized));
    }
}
