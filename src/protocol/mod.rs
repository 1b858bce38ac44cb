//! M3DA session security and password negotiation.
//!
//! # Authenticated exchange
//!
//! ```text
//! Device                                      Server
//!    |                                           |
//!    |--- id, nonce=Nd, mac(id, pw, Ns, body) -->|  Ns: last server nonce
//!    |                                           |
//!    |<-- status, nonce=Ns', mac(AIRVANTAGE, ----|  Ns' persisted for the
//!    |        pw, Nd, body)                      |  next request
//! ```
//!
//! A missing or wrong `mac` is answered with `401` carrying `challenge` and
//! a fresh nonce. After too many failures the server answers `403` and
//! closes the connection. With a cipher configured, payloads are ciphered
//! with the password and the peer's nonce before the MAC is computed.
//!
//! # Password negotiation
//!
//! A secured device holding only its registration password negotiates a
//! working password over ECDH:
//!
//! | State        | Expects                             | Sends                              |
//! |--------------|-------------------------------------|------------------------------------|
//! | `None`       | any envelope                        | 407 `autoreg_salt`, `autoreg_pubkey` |
//! | `WaitPubKey` | `autoreg_pubkey`, `autoreg_salt`, `autoreg_mac` | 407 `autoreg_ctext`, `autoreg_salt`, `autoreg_mac` |
//! | `WaitAck`    | `autoreg_mac`                       | nothing                            |
//! | `Done`       | nothing                             |                                    |
//!
//! # Usage
//!
//! ```rust,ignore
//! use m3da::protocol::{AuthenticationResult, SecurityHandler, Session};
//!
//! let handler = SecurityHandler::new(store.clone());
//! match handler.authenticate(&envelope, &mut session)? {
//!     AuthenticationResult::Success { payload } => { /* decode messages */ }
//!     AuthenticationResult::Replay { response } => { /* resend */ }
//!     AuthenticationResult::Failure { response, end_session } => { /* reply */ }
//! }
//! ```

mod device;
mod negotiation;
mod profile;
mod security;
mod session;

pub use device::{DeviceCredentials, DeviceError, DeviceNegotiation};
pub use negotiation::{NegotiationError, NegotiationHandler, NegotiationState, PasswordGenerator};
pub use profile::{Authentication, Encryption, ProfileParseError, SecurityInfo, INITIAL_NONCE};
pub use security::{AuthenticationResult, SecurityError, SecurityHandler};
pub use session::Session;

use crate::codec::pdu::{Envelope, Header, HeaderKey, StatusCode};

/// Checksum user name of server-originated envelopes.
pub const SERVER_ID: &str = "AIRVANTAGE";

/// Failed authentications tolerated before the connection is closed.
pub const DEFAULT_MAX_AUTH_ATTEMPTS: u32 = 3;

/// Random bytes in a nonce or salt.
pub const NONCE_BYTES: usize = 8;

/// Envelope with only a status header and an empty payload.
pub fn status_envelope(status: StatusCode) -> Envelope {
    Envelope::new(Header::new().with(HeaderKey::Status, status), Vec::new())
}
