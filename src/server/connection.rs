//! Per-connection protocol pipeline.
//!
//! [`Connection`] turns the bytes a device sends into the bytes to send
//! back. It does no I/O, so the TCP loop and the tests drive it the same
//! way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::state::AppState;
use crate::codec::bysant::{decode, encode_all, Value};
use crate::codec::pdu::{Envelope, Header, HeaderKey, Pdu, Response, StatusCode};
use crate::codec::{DecodeError, EnvelopeDecoder, EnvelopeEncoder};
use crate::protocol::{status_envelope, AuthenticationResult, SecurityInfo, Session};
use crate::store::{ReceivedEnvelope, ReceivedMessage};

/// What to do after feeding bytes to a [`Connection`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Encoded envelopes to write, in order
    pub writes: Vec<Vec<u8>>,
    /// Close the connection once the writes are flushed
    pub close: bool,
}

impl Reaction {
    fn write(&mut self, envelope: &Envelope) {
        self.writes.push(EnvelopeEncoder::new().encode(envelope));
    }

    fn reply_and_close(&mut self, status: StatusCode) {
        self.write(&status_envelope(status));
        self.close = true;
    }
}

/// Protocol state of one device connection.
pub struct Connection {
    app: Arc<AppState>,
    decoder: EnvelopeDecoder,
    session: Option<Session>,
}

impl Connection {
    pub fn new(app: Arc<AppState>) -> Self {
        Self {
            app,
            decoder: EnvelopeDecoder::new(),
            session: None,
        }
    }

    /// Session, once the first envelope has been accepted
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Feed bytes read from the socket.
    pub fn on_bytes(&mut self, chunk: &[u8]) -> Reaction {
        let mut reaction = Reaction::default();

        // Envelopes completed ahead of malformed bytes are answered first.
        let mut envelopes = Vec::new();
        let decoded = self.decode(chunk, &mut envelopes);

        for envelope in envelopes {
            self.on_envelope(envelope, &mut reaction);
            if reaction.close {
                return reaction;
            }
        }
        if let Err(e) = decoded {
            tracing::warn!(error = %e, "undecodable envelope stream, closing");
            reaction.close = true;
        }
        reaction
    }

    /// Signal that the peer closed its side.
    ///
    /// Fails if a partial envelope was left behind.
    pub fn on_eof(&mut self) -> Result<(), DecodeError> {
        std::mem::take(&mut self.decoder).finish_decode()
    }

    fn decode(&mut self, chunk: &[u8], envelopes: &mut Vec<Envelope>) -> Result<(), DecodeError> {
        self.decoder.decode_and_accumulate(chunk, envelopes)?;

        // An envelope decoder is single use: bytes that followed the
        // emitted envelopes move on to a fresh one.
        while self.decoder.is_spent() {
            let pending = std::mem::take(&mut self.decoder).into_pending();
            if !pending.is_empty() {
                self.decoder.decode_and_accumulate(&pending, envelopes)?;
            }
        }
        Ok(())
    }

    fn on_envelope(&mut self, envelope: Envelope, reaction: &mut Reaction) {
        let app = Arc::clone(&self.app);
        let Some(session) = self.session_for(&envelope) else {
            reaction.close = true;
            return;
        };

        if session.needs_negotiation() {
            match app.negotiation.handle(&envelope, session) {
                Ok(Some(reply)) => reaction.write(&reply),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(comm_id = %session.comm_id(), error = %e, "password negotiation failed");
                    session.reset_negotiation();
                    reaction.reply_and_close(StatusCode::Forbidden);
                }
            }
            return;
        }

        let response = match app.security.authenticate(&envelope, session) {
            Ok(AuthenticationResult::Success { payload }) => {
                match business_response(&app, session.comm_id(), &payload) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(comm_id = %session.comm_id(), error = %e, "malformed payload, closing");
                        reaction.reply_and_close(StatusCode::BadRequest);
                        return;
                    }
                }
            }
            Ok(AuthenticationResult::Replay { response }) => response,
            Ok(AuthenticationResult::Failure {
                response,
                end_session,
            }) => {
                reaction.write(&response);
                reaction.close = end_session;
                return;
            }
            Err(e) => {
                tracing::error!(comm_id = %session.comm_id(), error = %e, "authentication error");
                reaction.reply_and_close(StatusCode::UnexpectedError);
                return;
            }
        };

        match app.security.sign_response(response, session) {
            Ok(signed) => reaction.write(&signed),
            Err(e) => {
                tracing::error!(comm_id = %session.comm_id(), error = %e, "cannot sign response");
                reaction.reply_and_close(StatusCode::UnexpectedError);
            }
        }
    }

    fn session_for(&mut self, envelope: &Envelope) -> Option<&mut Session> {
        let comm_id = envelope.comm_id();
        if let Some(session) = &self.session {
            if let Some(id) = comm_id.filter(|id| *id != session.comm_id()) {
                tracing::warn!(session = %session.comm_id(), envelope = id, "communication id changed, closing");
                return None;
            }
        } else {
            let Some(id) = comm_id else {
                tracing::warn!("first envelope without communication id, closing");
                return None;
            };
            let security = self
                .app
                .security_store
                .security_info(id)
                .unwrap_or_else(|| SecurityInfo::unsecured(id));
            tracing::info!(comm_id = id, authentication = %security.authentication, "session opened");
            self.session = Some(Session::new(id, security));
        }
        self.session.as_mut()
    }
}

/// Store the messages of an authenticated payload and build the 200 reply
/// carrying queued messages and acknowledgements of ticketed messages.
fn business_response(app: &AppState, comm_id: &str, payload: &[u8]) -> Result<Envelope, DecodeError> {
    let mut acks = Vec::new();

    if !payload.is_empty() {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut messages = Vec::new();
        for value in decode(payload)? {
            match value {
                Value::Pdu(pdu) => match *pdu {
                    Pdu::Message(message) => {
                        if let Some(ticket_id) = message.ticket_id {
                            acks.push(Response {
                                ticket_id,
                                status: 0,
                                message: String::new(),
                            });
                        }
                        messages.push(ReceivedMessage::from_message(&message, now_ms));
                    }
                    Pdu::Response(response) => {
                        tracing::debug!(comm_id, ticket_id = response.ticket_id, status = response.status, "device acknowledgement");
                    }
                    Pdu::Envelope(_) => tracing::warn!(comm_id, "nested envelope in payload ignored"),
                },
                other => tracing::warn!(comm_id, kind = other.kind(), "non-PDU value in payload ignored"),
            }
        }
        tracing::info!(comm_id, messages = messages.len(), "data received");
        app.store.enqueue_received_data(
            comm_id,
            reception_nanos(),
            ReceivedEnvelope {
                reception_ms: now_ms,
                messages,
            },
        );
    }

    let outgoing = app.store.pop_data_to_send(comm_id).unwrap_or_default();
    if !outgoing.is_empty() {
        tracing::info!(comm_id, messages = outgoing.len(), "sending queued data");
    }
    let pdus: Vec<Value> = outgoing
        .into_iter()
        .map(Pdu::Message)
        .chain(acks.into_iter().map(Pdu::Response))
        .map(Value::from)
        .collect();

    let header = Header::new().with(HeaderKey::Status, StatusCode::Ok);
    Ok(Envelope::new(header, encode_all(&pdus)))
}

/// Wall-clock nanoseconds, strictly increasing across calls.
fn reception_nanos() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);
    let previous = LAST
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}
