//! Incremental Bysant decoder.
//!
//! Bytes arrive in arbitrary chunks. The decoder emits each top-level value
//! to the caller's [`DecoderOutput`] as soon as its last byte is in.
//!
//! # Resumption
//!
//! ```text
//!  chunk 1          chunk 2             chunk 3
//! [6F 51 02 69 64] [05 64 65 76 2D 31] [24 50 ...]
//!  │  │  └─ leaf    └─ leaf             └─ leaf ... close ─► emit
//!  │  └─ open map (2 entries)
//!  └─ open envelope (3 items)
//! ```
//!
//! Input is cut into tokens: a scalar, a string or byte string, the header
//! of a container, or the packed deltas of a delta vector. A token is
//! parsed once, when all of its bytes are buffered. Containers under
//! construction live on an explicit stack with the items collected so far,
//! so a chunk never causes earlier tokens to be read again.
//!
//! The raw bytes of the pending top-level value stay buffered until it
//! completes, for callers that hand them over to another decoder.

use std::collections::BTreeMap;

use bytes::{Buf, BytesMut};

use super::tags;
use super::value::{Map, Value};
use super::vector::{DeltaVector, Number, QuasiPeriodicVector, ShiftsError};
use crate::codec::error::DecodeError;
use crate::codec::pdu::{Envelope, Header, HeaderKey, Message, Pdu, Response};
use crate::codec::varint::{read_varint_slice, VarIntRead};

/// Sink receiving decoded items in stream order.
pub trait DecoderOutput<T> {
    /// Called once per fully decoded item.
    fn decoded(&mut self, item: T);
}

impl<T> DecoderOutput<T> for Vec<T> {
    fn decoded(&mut self, item: T) {
        self.push(item);
    }
}

/// Stateful decoder for one byte stream.
#[derive(Debug, Default)]
pub struct BysantDecoder {
    /// Bytes of the pending top-level value, from its first byte.
    buffer: BytesMut,
    /// Length of the already tokenized prefix of `buffer`.
    cursor: usize,
    /// Stream offset of `buffer[0]`.
    base: usize,
    /// Buffered length below which the next token cannot be complete.
    needed: usize,
    /// Open containers, innermost last.
    stack: Vec<Frame>,
    failure: Option<DecodeError>,
    finished: bool,
    /// Bytes read by token parsing, retries included.
    #[cfg(test)]
    examined: usize,
}

impl BysantDecoder {
    /// Create a decoder for a new stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly arrived bytes and emit every value they complete.
    ///
    /// Values completed before a decode error are still emitted.
    pub fn decode_and_accumulate<O: DecoderOutput<Value>>(
        &mut self,
        chunk: &[u8],
        output: &mut O,
    ) -> Result<(), DecodeError> {
        let mut decoded = Vec::new();
        let result = self.accumulate(chunk, &mut decoded);
        for (_, value) in decoded {
            output.decoded(value);
        }
        result
    }

    /// Signal end of stream. Fails when buffered bytes do not form a value.
    pub fn finish_decode(&mut self) -> Result<(), DecodeError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.finished {
            return Err(DecodeError::Finished);
        }
        self.finished = true;
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                remaining: self.buffer.len(),
            })
        }
    }

    /// Whether bytes of an incomplete value are buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Take the buffered bytes of the incomplete value, if any.
    pub fn into_pending(self) -> BytesMut {
        self.buffer
    }

    /// Decode `chunk` and push each completed value with its stream offset.
    pub(crate) fn accumulate(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<(usize, Value)>,
    ) -> Result<(), DecodeError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.finished {
            return Err(DecodeError::Finished);
        }

        self.buffer.extend_from_slice(chunk);
        self.drain(out).map_err(|err| {
            tracing::debug!(error = %err, "bysant decode failed");
            self.failure = Some(err.clone());
            err
        })
    }

    fn drain(&mut self, out: &mut Vec<(usize, Value)>) -> Result<(), DecodeError> {
        while self.cursor < self.buffer.len() && self.buffer.len() >= self.needed {
            let offset = self.base + self.cursor;
            let wants_deltas = self.wants_deltas();
            let mut reader = Reader::new(&self.buffer[self.cursor..], offset);
            let step = if wants_deltas {
                reader.packed_deltas().map(Step::Deltas)
            } else {
                reader.token().map(Step::Token)
            };
            let used = reader.pos;
            #[cfg(test)]
            {
                self.examined += used;
            }

            let step = match step {
                Ok(step) => step,
                Err(Halt::NeedMore(total)) => {
                    self.needed = self.cursor + total;
                    return Ok(());
                }
                Err(Halt::Fail(err)) => return Err(err),
            };
            self.cursor += used;
            self.needed = 0;

            match step {
                Step::Token(Token::Value(value)) => self.complete(offset, value, out)?,
                Step::Token(Token::Open(kind, items)) => {
                    if self.stack.len() >= tags::MAX_DEPTH {
                        return Err(DecodeError::TooDeep {
                            limit: tags::MAX_DEPTH,
                            offset,
                        });
                    }
                    let frame = Frame::new(kind, offset, items);
                    if frame.is_complete() {
                        let value = frame.finish()?;
                        self.complete(offset, value, out)?;
                    } else {
                        self.stack.push(frame);
                    }
                }
                Step::Deltas(deltas) => {
                    if let Some(mut frame) = self.stack.pop() {
                        frame.deltas = Some(deltas);
                        let vector_offset = frame.offset;
                        let value = frame.finish()?;
                        self.complete(vector_offset, value, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The open delta vector has its factor and start and waits for deltas.
    fn wants_deltas(&self) -> bool {
        self.stack.last().is_some_and(|frame| {
            frame.kind == Kind::DeltaVector && frame.items.len() == 2 && frame.deltas.is_none()
        })
    }

    /// Hand a finished value to its container, closing every container it
    /// completes. A finished top-level value goes to `out`.
    fn complete(
        &mut self,
        offset: usize,
        value: Value,
        out: &mut Vec<(usize, Value)>,
    ) -> Result<(), DecodeError> {
        let mut item = (offset, value);
        while let Some(mut frame) = self.stack.pop() {
            frame.items.push(item);
            if !frame.is_complete() {
                self.stack.push(frame);
                return Ok(());
            }
            let offset = frame.offset;
            item = (offset, frame.finish()?);
        }

        out.push(item);
        self.buffer.advance(self.cursor);
        self.base += self.cursor;
        self.cursor = 0;
        Ok(())
    }
}

/// Decode a complete byte sequence into its top-level values.
pub fn decode(bytes: &[u8]) -> Result<Vec<Value>, DecodeError> {
    let mut decoder = BysantDecoder::new();
    let mut values = Vec::new();
    decoder.decode_and_accumulate(bytes, &mut values)?;
    decoder.finish_decode()?;
    Ok(values)
}

/// Container under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    List,
    Map,
    DeltaVector,
    QuasiPeriodicVector,
    Envelope,
    Message,
    Response,
}

#[derive(Debug)]
struct Frame {
    kind: Kind,
    /// Stream offset of the container tag
    offset: usize,
    /// Items the container holds; a map holds two per entry
    expected: usize,
    items: Vec<(usize, Value)>,
    deltas: Option<Vec<i64>>,
}

impl Frame {
    fn new(kind: Kind, offset: usize, expected: usize) -> Self {
        Self {
            kind,
            offset,
            expected,
            items: Vec::with_capacity(expected.min(1024)),
            deltas: None,
        }
    }

    fn is_complete(&self) -> bool {
        self.items.len() == self.expected
            && (self.kind != Kind::DeltaVector || self.deltas.is_some())
    }

    /// Build the value from the collected items, checking their types.
    fn finish(self) -> Result<Value, DecodeError> {
        let offset = self.offset;
        let mut items = self.items.into_iter();
        let value = match self.kind {
            Kind::List => Value::List(items.map(|(_, v)| v).collect()),
            Kind::Map => {
                let mut pairs: Map = Vec::with_capacity(items.len() / 2);
                while let (Some((_, key)), Some((_, value))) = (items.next(), items.next()) {
                    pairs.push((key, value));
                }
                Value::Map(pairs)
            }
            Kind::DeltaVector => Value::DeltaVector(DeltaVector {
                factor: number(next(&mut items, offset))?,
                start: number(next(&mut items, offset))?,
                deltas: self.deltas.unwrap_or_default(),
            }),
            Kind::QuasiPeriodicVector => {
                Value::QuasiPeriodicVector(quasi_periodic_vector(&mut items, offset)?)
            }
            Kind::Envelope => Value::from(Pdu::Envelope(envelope(&mut items, offset)?)),
            Kind::Message => Value::from(Pdu::Message(message(&mut items, offset)?)),
            Kind::Response => Value::from(Pdu::Response(response(&mut items, offset)?)),
        };
        Ok(value)
    }
}

/// Smallest unit of input parsed at once.
enum Token {
    Value(Value),
    /// Container tag and the number of items that follow
    Open(Kind, usize),
}

enum Step {
    Token(Token),
    Deltas(Vec<i64>),
}

/// Why parsing stopped.
enum Halt {
    /// Input ends early; the token needs at least this many bytes.
    NeedMore(usize),
    /// Input is malformed.
    Fail(DecodeError),
}

type Parse<T> = Result<T, Halt>;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn byte(&mut self) -> Parse<u8> {
        match self.data.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(Halt::NeedMore(self.pos + 1)),
        }
    }

    fn take(&mut self, n: usize) -> Parse<&'a [u8]> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(Halt::NeedMore(end));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Parse<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn varint(&mut self) -> Parse<u64> {
        match read_varint_slice(&self.data[self.pos..]) {
            VarIntRead::Complete(value, used) => {
                self.pos += used;
                Ok(value)
            }
            VarIntRead::Incomplete => Err(Halt::NeedMore(self.data.len() + 1)),
            VarIntRead::Overflow => Err(Halt::Fail(DecodeError::VarIntOverflow {
                offset: self.offset(),
            })),
        }
    }

    /// Varint length or count, bounded by `MAX_LENGTH`.
    fn length(&mut self) -> Parse<usize> {
        let offset = self.offset();
        let length = self.varint()?;
        match usize::try_from(length) {
            Ok(n) if n <= tags::MAX_LENGTH => Ok(n),
            _ => Err(Halt::Fail(DecodeError::LengthOverflow {
                length,
                limit: tags::MAX_LENGTH,
                offset,
            })),
        }
    }

    fn token(&mut self) -> Parse<Token> {
        let offset = self.offset();
        let tag = self.byte()?;

        let value = match tag {
            tags::NULL => Value::Null,
            tags::TRUE => Value::Bool(true),
            tags::FALSE => Value::Bool(false),
            0x03..=0x22 => Value::String(self.string_body(usize::from(tag - tags::SHORT_STRING))?),
            tags::STRING => {
                let len = self.length()?;
                Value::String(self.string_body(len)?)
            }
            0x24..=0x43 => Value::Bytes(self.take(usize::from(tag - tags::SHORT_BYTES))?.to_vec()),
            tags::BYTES => {
                let len = self.length()?;
                Value::Bytes(self.take(len)?.to_vec())
            }
            0x45..=0x54 => return Ok(Token::Open(Kind::List, usize::from(tag - tags::SHORT_LIST))),
            tags::LIST => return Ok(Token::Open(Kind::List, self.length()?)),
            0x56..=0x65 => {
                return Ok(Token::Open(Kind::Map, 2 * usize::from(tag - tags::SHORT_MAP)))
            }
            tags::MAP => return Ok(Token::Open(Kind::Map, 2 * self.length()?)),
            tags::INT8 => Value::Int(i64::from(i8::from_be_bytes(self.array()?))),
            tags::INT16 => Value::Int(i64::from(i16::from_be_bytes(self.array()?))),
            tags::INT32 => Value::Int(i64::from(i32::from_be_bytes(self.array()?))),
            tags::INT64 => Value::Int(i64::from_be_bytes(self.array()?)),
            tags::FLOAT32 => Value::Float(f64::from(f32::from_be_bytes(self.array()?))),
            tags::FLOAT64 => Value::Float(f64::from_be_bytes(self.array()?)),
            tags::DELTA_VECTOR => return Ok(Token::Open(Kind::DeltaVector, 2)),
            tags::QUASI_PERIODIC_VECTOR => return Ok(Token::Open(Kind::QuasiPeriodicVector, 3)),
            tags::ENVELOPE => return Ok(Token::Open(Kind::Envelope, 3)),
            tags::MESSAGE => return Ok(Token::Open(Kind::Message, 3)),
            tags::RESPONSE => return Ok(Token::Open(Kind::Response, 3)),
            tags::SMALL_INT_FIRST..=0xFF => Value::Int(i64::from(tag) - tags::SMALL_INT_BIAS),
            _ => return Err(Halt::Fail(DecodeError::InvalidTag { tag, offset })),
        };
        Ok(Token::Value(value))
    }

    fn string_body(&mut self, len: usize) -> Parse<String> {
        let offset = self.offset();
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Halt::Fail(DecodeError::InvalidUtf8 { offset }))
    }

    /// Width byte, sample count and packed big-endian deltas.
    fn packed_deltas(&mut self) -> Parse<Vec<i64>> {
        let width_offset = self.offset();
        let width = self.byte()?;
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(Halt::Fail(DecodeError::WrongType {
                expected: "delta width 1, 2, 4 or 8",
                found: width.to_string(),
                offset: width_offset,
            }));
        }
        let width = usize::from(width);

        let count_offset = self.offset();
        let count = self.length()?;
        if count >= tags::MAX_VECTOR_SAMPLES {
            return Err(Halt::Fail(DecodeError::VectorTooLarge {
                limit: tags::MAX_VECTOR_SAMPLES,
                offset: count_offset,
            }));
        }
        let span = count * width;
        if span > tags::MAX_LENGTH {
            return Err(Halt::Fail(DecodeError::LengthOverflow {
                length: span as u64,
                limit: tags::MAX_LENGTH,
                offset: count_offset,
            }));
        }

        let packed = self.take(span)?;
        Ok(packed
            .chunks_exact(width)
            .map(|chunk| {
                let fill = if chunk[0] & 0x80 != 0 { 0xFF } else { 0x00 };
                let mut be = [fill; 8];
                be[8 - width..].copy_from_slice(chunk);
                i64::from_be_bytes(be)
            })
            .collect())
    }
}

// Typed items: a well-formed value of another variant is a WrongType error.

type Items = std::vec::IntoIter<(usize, Value)>;

/// Next item of a complete fixed-arity container.
fn next(items: &mut Items, container: usize) -> (usize, Value) {
    items.next().unwrap_or((container, Value::Null))
}

fn typed<T>(
    (offset, value): (usize, Value),
    expected: &'static str,
    convert: impl FnOnce(Value) -> Result<T, Value>,
) -> Result<T, DecodeError> {
    convert(value).map_err(|found| DecodeError::WrongType {
        expected,
        found: found.kind().to_string(),
        offset,
    })
}

fn number(item: (usize, Value)) -> Result<Number, DecodeError> {
    typed(item, "number", |v| v.as_number().ok_or(v))
}

fn text(item: (usize, Value)) -> Result<String, DecodeError> {
    typed(item, "string", |v| match v {
        Value::String(s) => Ok(s),
        Value::Bytes(b) => String::from_utf8(b).map_err(|e| Value::Bytes(e.into_bytes())),
        other => Err(other),
    })
}

fn map(item: (usize, Value)) -> Result<(usize, Map), DecodeError> {
    let offset = item.0;
    let pairs = typed(item, "map", |v| match v {
        Value::Map(pairs) => Ok(pairs),
        other => Err(other),
    })?;
    Ok((offset, pairs))
}

fn quasi_periodic_vector(items: &mut Items, offset: usize) -> Result<QuasiPeriodicVector, DecodeError> {
    let period = number(next(items, offset))?;
    let start = number(next(items, offset))?;
    let shifts = typed(next(items, offset), "list of integers", |v| match v {
        Value::List(list) => {
            let ints: Option<Vec<i64>> = list.iter().map(Value::as_int).collect();
            ints.ok_or(Value::List(list))
        }
        other => Err(other),
    })?;

    QuasiPeriodicVector::new(period, start, shifts).map_err(|err| match err {
        ShiftsError::NegativeCount(count) => DecodeError::WrongType {
            expected: "non-negative repetition count",
            found: count.to_string(),
            offset,
        },
        ShiftsError::TooLarge => DecodeError::VectorTooLarge {
            limit: tags::MAX_VECTOR_SAMPLES,
            offset,
        },
    })
}

fn envelope(items: &mut Items, offset: usize) -> Result<Envelope, DecodeError> {
    let (header_offset, pairs) = map(next(items, offset))?;
    let mut header = Header::new();
    for (key, value) in pairs {
        let name = key.as_text().ok_or_else(|| DecodeError::WrongType {
            expected: "string header key",
            found: key.kind().to_string(),
            offset: header_offset,
        })?;
        header.insert(HeaderKey::from(name), value);
    }

    let payload = typed(next(items, offset), "bytes", |v| match v {
        Value::Bytes(b) => Ok(b),
        Value::String(s) => Ok(s.into_bytes()),
        other => Err(other),
    })?;
    let (_, footer) = map(next(items, offset))?;

    Ok(Envelope {
        header,
        payload,
        footer,
    })
}

fn message(items: &mut Items, offset: usize) -> Result<Message, DecodeError> {
    let path = text(next(items, offset))?;
    let ticket_id = typed(next(items, offset), "ticket id or null", |v| match v {
        Value::Null => Ok(None),
        Value::Int(i) => u32::try_from(i).map(Some).map_err(|_| Value::Int(i)),
        other => Err(other),
    })?;

    let (body_offset, pairs) = map(next(items, offset))?;
    let mut body = BTreeMap::new();
    for (key, value) in pairs {
        let key = match key {
            Value::String(s) => s,
            other => match other.as_text() {
                Some(text) => text.to_string(),
                None => {
                    return Err(DecodeError::WrongType {
                        expected: "string body key",
                        found: other.kind().to_string(),
                        offset: body_offset,
                    })
                }
            },
        };
        body.insert(key, value);
    }

    Ok(Message {
        path,
        ticket_id,
        body,
    })
}

fn response(items: &mut Items, offset: usize) -> Result<Response, DecodeError> {
    let ticket_id = typed(next(items, offset), "ticket id", |v| match v {
        Value::Int(i) => u32::try_from(i).map_err(|_| Value::Int(i)),
        other => Err(other),
    })?;
    let status = typed(next(items, offset), "integer status", |v| v.as_int().ok_or(v))?;
    let message = text(next(items, offset))?;
    Ok(Response {
        ticket_id,
        status,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bysant::encoder::{encode, encode_all};

    fn decode_one(bytes: &[u8]) -> Value {
        let mut values = decode(bytes).unwrap();
        assert_eq!(values.len(), 1);
        values.remove(0)
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(decode_one(&[0x00]), Value::Null);
        assert_eq!(decode_one(&[0x01]), Value::Bool(true));
        assert_eq!(decode_one(&[0xC0]), Value::Int(0));
        assert_eq!(decode_one(&[0x80]), Value::Int(-64));
        assert_eq!(decode_one(&[0x68, 0xFF, 0x38]), Value::Int(-200));
        assert_eq!(decode_one(&[0x6B, 0x3F, 0xC0, 0x00, 0x00]), Value::Float(1.5));
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let value = Value::List(vec![
            Value::from("temperature"),
            Value::Float(0.1),
            Value::from(DeltaVector::new(10, 3, vec![1, 200, -70_000])),
        ]);
        let bytes = encode(&value);

        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        for (i, b) in bytes.iter().enumerate() {
            decoder.decode_and_accumulate(&[*b], &mut out).unwrap();
            if i + 1 < bytes.len() {
                assert!(out.is_empty());
                assert!(decoder.has_pending());
            }
        }
        assert_eq!(out, vec![value]);
        decoder.finish_decode().unwrap();
    }

    #[test]
    fn test_multiple_values_in_one_chunk() {
        let values = vec![Value::Int(1), Value::from("two"), Value::Null];
        assert_eq!(decode(&encode_all(&values)).unwrap(), values);
    }

    #[test]
    fn test_invalid_tag_reports_offset() {
        let err = decode(&[0xC1, 0xC2, 0x72]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidTag { tag: 0x72, offset: 2 });
    }

    #[test]
    fn test_offset_survives_chunking() {
        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        decoder.decode_and_accumulate(&[0xC1, 0xC2], &mut out).unwrap();
        let err = decoder.decode_and_accumulate(&[0x46, 0x7F], &mut out).unwrap_err();
        assert_eq!(err, DecodeError::InvalidTag { tag: 0x7F, offset: 3 });
    }

    #[test]
    fn test_failed_decoder_stays_failed() {
        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        assert!(decoder.decode_and_accumulate(&[0x7F], &mut out).is_err());
        let again = decoder.decode_and_accumulate(&[0x00], &mut out);
        assert_eq!(again, Err(DecodeError::InvalidTag { tag: 0x7F, offset: 0 }));
        assert!(out.is_empty());
    }

    #[test]
    fn test_trailing_bytes_on_finish() {
        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        decoder.decode_and_accumulate(&[0x00, 0x05, b'a'], &mut out).unwrap();
        assert_eq!(out, vec![Value::Null]);
        assert_eq!(
            decoder.finish_decode(),
            Err(DecodeError::TrailingBytes { remaining: 2 })
        );
    }

    #[test]
    fn test_use_after_finish() {
        let mut decoder = BysantDecoder::new();
        decoder.finish_decode().unwrap();
        let mut out = Vec::new();
        assert_eq!(
            decoder.decode_and_accumulate(&[0x00], &mut out),
            Err(DecodeError::Finished)
        );
    }

    #[test]
    fn test_length_limit() {
        let mut bytes = vec![tags::BYTES];
        crate::codec::varint::write_varint_vec(&mut bytes, (tags::MAX_LENGTH + 1) as u64);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::LengthOverflow { offset: 1, .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let bytes = vec![0x46; tags::MAX_DEPTH + 1];
        assert!(matches!(decode(&bytes), Err(DecodeError::TooDeep { .. })));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(
            decode(&[0x04, 0xFF]),
            Err(DecodeError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn test_delta_vector_non_numeric_factor() {
        // factor is the string "a"
        let bytes = [tags::DELTA_VECTOR, 0x04, b'a', 0xC0, 0x01, 0x00];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::WrongType {
                expected: "number",
                found: "string".to_string(),
                offset: 1,
            })
        );
    }

    #[test]
    fn test_delta_vector_bad_width() {
        let bytes = [tags::DELTA_VECTOR, 0xC1, 0xC0, 0x03, 0x00];
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::WrongType { offset: 3, .. })
        ));
    }

    #[test]
    fn test_quasi_periodic_negative_count() {
        // period 1, start 0, shifts [-1, 0]
        let bytes = [tags::QUASI_PERIODIC_VECTOR, 0xC1, 0xC0, 0x47, 0xBF, 0xC0];
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::WrongType { offset: 0, .. })
        ));
    }

    #[test]
    fn test_chunked_large_list_reads_each_byte_once() {
        let items: Vec<Value> = (0..20_000)
            .map(|i| Value::from(format!("sample-{i:05}-with-padding")))
            .collect();
        let value = Value::List(items);
        let bytes = encode(&value);

        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        let mut chunks = 0;
        for chunk in bytes.chunks(7) {
            decoder.decode_and_accumulate(chunk, &mut out).unwrap();
            chunks += 1;
        }
        decoder.finish_decode().unwrap();
        assert_eq!(out, vec![value]);

        // A string split across chunks re-reads at most its tag and length.
        assert!(
            decoder.examined <= bytes.len() + chunks * 8,
            "examined {} bytes for a {} byte input",
            decoder.examined,
            bytes.len()
        );
    }

    #[test]
    fn test_partial_list_keeps_collected_items() {
        let bytes = encode(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        decoder.decode_and_accumulate(&bytes[..3], &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(decoder.stack.len(), 1);
        assert_eq!(decoder.stack[0].items.len(), 2);
        assert_eq!(decoder.cursor, 3);

        decoder.decode_and_accumulate(&bytes[3..], &mut out).unwrap();
        assert_eq!(decoder.examined, bytes.len());
        assert!(decoder.stack.is_empty());
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_values_before_error_are_emitted() {
        let mut decoder = BysantDecoder::new();
        let mut out = Vec::new();
        let err = decoder.decode_and_accumulate(&[0xC1, 0x00, 0x7F], &mut out).unwrap_err();
        assert_eq!(err, DecodeError::InvalidTag { tag: 0x7F, offset: 2 });
        assert_eq!(out, vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn test_delta_span_limit() {
        // width 8 with a count under the sample cap but a span over MAX_LENGTH
        let mut bytes = vec![tags::DELTA_VECTOR, 0xC1, 0xC0, 0x08];
        let count = tags::MAX_LENGTH / 8 + 1;
        crate::codec::varint::write_varint_vec(&mut bytes, count as u64);
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::LengthOverflow { offset: 4, .. })
        ));
    }

    #[test]
    fn test_empty_containers_close_at_once() {
        let value = Value::List(vec![Value::List(vec![]), Value::Map(vec![])]);
        assert_eq!(decode_one(&encode(&value)), value);
    }

    #[test]
    fn test_sign_extension_of_packed_deltas() {
        let v = DeltaVector::new(1, 0, vec![-1, -32768, 32767]);
        assert_eq!(decode_one(&encode(&Value::from(v.clone()))), Value::from(v));
    }
}
