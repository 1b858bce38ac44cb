//! Envelope framing on top of the Bysant codec.
//!
//! One [`EnvelopeDecoder`] serves one logical exchange. Once it has emitted
//! an envelope it refuses further input; the caller moves any bytes that
//! followed into a fresh decoder with [`EnvelopeDecoder::into_pending`].

use bytes::BytesMut;

use super::bysant::{encode_pdu, BysantDecoder, DecoderOutput, Value};
use super::error::DecodeError;
use super::pdu::{Envelope, Pdu};

/// Serializes envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeEncoder;

impl EnvelopeEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode one envelope.
    pub fn encode(&self, envelope: &Envelope) -> Vec<u8> {
        encode_pdu(&Pdu::Envelope(envelope.clone()))
    }
}

/// Incremental decoder that only accepts envelopes at the top level.
///
/// A bare top-level Message is accepted as a legacy single-item send and
/// wrapped with [`Envelope::wrap_message`]. Anything else is parasite data.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    inner: BysantDecoder,
    accumulated: Vec<Envelope>,
    emitted: bool,
}

impl EnvelopeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly arrived bytes.
    ///
    /// Every envelope completed by `chunk` is handed to `output` at once;
    /// after that the decoder is spent. Envelopes completed before malformed
    /// bytes are still handed over, then the decode error is returned.
    /// Parasite data discards them.
    pub fn decode_and_accumulate<O: DecoderOutput<Envelope>>(
        &mut self,
        chunk: &[u8],
        output: &mut O,
    ) -> Result<(), DecodeError> {
        if self.emitted {
            return Err(DecodeError::DecoderReused);
        }

        let mut values = Vec::new();
        let decoded = self.inner.accumulate(chunk, &mut values);
        for (offset, value) in values {
            match value {
                Value::Pdu(pdu) => match *pdu {
                    Pdu::Envelope(envelope) => self.accumulated.push(envelope),
                    Pdu::Message(message) => {
                        tracing::debug!(path = %message.path, "wrapping bare message in an envelope");
                        self.accumulated.push(Envelope::wrap_message(message));
                    }
                    other => return Err(self.parasite(other.kind(), offset)),
                },
                other => return Err(self.parasite(other.kind(), offset)),
            }
        }

        if !self.accumulated.is_empty() {
            self.emitted = true;
            for envelope in self.accumulated.drain(..) {
                output.decoded(envelope);
            }
        }
        decoded
    }

    /// Signal end of stream.
    pub fn finish_decode(&mut self) -> Result<(), DecodeError> {
        self.inner.finish_decode()
    }

    /// Whether an envelope has already been emitted.
    pub fn is_spent(&self) -> bool {
        self.emitted
    }

    /// Whether bytes of an incomplete envelope are buffered.
    pub fn has_pending(&self) -> bool {
        self.inner.has_pending()
    }

    /// Bytes received after the last complete envelope.
    pub fn into_pending(self) -> BytesMut {
        self.inner.into_pending()
    }

    fn parasite(&mut self, found: &'static str, offset: usize) -> DecodeError {
        tracing::warn!(found, offset, "parasite data in envelope stream");
        self.accumulated.clear();
        DecodeError::ParasiteData { found, offset }
    }
}
