//! Bysant encoder.

use super::tags;
use super::value::Value;
use super::vector::{DeltaVector, Number, QuasiPeriodicVector};
use crate::codec::pdu::{Envelope, Header, Message, Pdu, Response};
use crate::codec::varint::write_varint_vec;

/// Encode a single value.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(&mut buf, value);
    buf
}

/// Encode a sequence of top-level values back to back.
pub fn encode_all(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in values {
        encode_value(&mut buf, value);
    }
    buf
}

/// Append the encoding of `value` to `buf`.
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(tags::NULL),
        Value::Bool(true) => buf.push(tags::TRUE),
        Value::Bool(false) => buf.push(tags::FALSE),
        Value::Int(i) => write_int(buf, *i),
        Value::Float(f) => write_float(buf, *f),
        Value::String(s) => write_str(buf, s),
        Value::Bytes(b) => write_bytes(buf, b),
        Value::List(items) => {
            write_counted(buf, tags::SHORT_LIST, tags::LIST, items.len());
            for item in items {
                encode_value(buf, item);
            }
        }
        Value::Map(pairs) => write_map(buf, pairs),
        Value::DeltaVector(v) => write_delta_vector(buf, v),
        Value::QuasiPeriodicVector(v) => write_quasi_periodic_vector(buf, v),
        Value::Pdu(pdu) => encode_pdu_into(buf, pdu),
    }
}

/// Encode a PDU.
pub fn encode_pdu(pdu: &Pdu) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_pdu_into(&mut buf, pdu);
    buf
}

fn encode_pdu_into(buf: &mut Vec<u8>, pdu: &Pdu) {
    match pdu {
        Pdu::Envelope(envelope) => write_envelope(buf, envelope),
        Pdu::Message(message) => write_message(buf, message),
        Pdu::Response(response) => write_response(buf, response),
    }
}

fn write_int(buf: &mut Vec<u8>, i: i64) {
    if (tags::SMALL_INT_MIN..=tags::SMALL_INT_MAX).contains(&i) {
        buf.push((i + tags::SMALL_INT_BIAS) as u8);
    } else if let Ok(v) = i8::try_from(i) {
        buf.push(tags::INT8);
        buf.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i16::try_from(i) {
        buf.push(tags::INT16);
        buf.extend_from_slice(&v.to_be_bytes());
    } else if let Ok(v) = i32::try_from(i) {
        buf.push(tags::INT32);
        buf.extend_from_slice(&v.to_be_bytes());
    } else {
        buf.push(tags::INT64);
        buf.extend_from_slice(&i.to_be_bytes());
    }
}

fn write_float(buf: &mut Vec<u8>, f: f64) {
    let narrow = f as f32;
    if f64::from(narrow).to_bits() == f.to_bits() {
        buf.push(tags::FLOAT32);
        buf.extend_from_slice(&narrow.to_be_bytes());
    } else {
        buf.push(tags::FLOAT64);
        buf.extend_from_slice(&f.to_be_bytes());
    }
}

fn write_number(buf: &mut Vec<u8>, n: Number) {
    match n {
        Number::Int(i) => write_int(buf, i),
        Number::Float(f) => write_float(buf, f),
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_sized(buf, tags::SHORT_BYTES, tags::BYTES, bytes.len());
    buf.extend_from_slice(bytes);
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    write_sized(buf, tags::SHORT_STRING, tags::STRING, s.len());
    buf.extend_from_slice(s.as_bytes());
}

fn write_sized(buf: &mut Vec<u8>, short_tag: u8, long_tag: u8, len: usize) {
    write_prefix(buf, short_tag, long_tag, tags::SHORT_LEN_MAX, len);
}

fn write_counted(buf: &mut Vec<u8>, short_tag: u8, long_tag: u8, count: usize) {
    write_prefix(buf, short_tag, long_tag, tags::SHORT_COUNT_MAX, count);
}

fn write_prefix(buf: &mut Vec<u8>, short_tag: u8, long_tag: u8, short_max: usize, n: usize) {
    if n <= short_max {
        buf.push(short_tag + n as u8);
    } else {
        buf.push(long_tag);
        write_varint_vec(buf, n as u64);
    }
}

fn write_delta_vector(buf: &mut Vec<u8>, v: &DeltaVector) {
    buf.push(tags::DELTA_VECTOR);
    write_number(buf, v.factor);
    write_number(buf, v.start);
    let width = v.delta_width();
    buf.push(width);
    write_varint_vec(buf, v.deltas.len() as u64);
    for &delta in &v.deltas {
        let be = delta.to_be_bytes();
        buf.extend_from_slice(&be[8 - usize::from(width)..]);
    }
}

fn write_quasi_periodic_vector(buf: &mut Vec<u8>, v: &QuasiPeriodicVector) {
    buf.push(tags::QUASI_PERIODIC_VECTOR);
    write_number(buf, v.period());
    write_number(buf, v.start());
    write_counted(buf, tags::SHORT_LIST, tags::LIST, v.shifts().len());
    for &shift in v.shifts() {
        write_int(buf, shift);
    }
}

fn write_header(buf: &mut Vec<u8>, header: &Header) {
    write_counted(buf, tags::SHORT_MAP, tags::MAP, header.len());
    for (key, value) in header.iter() {
        write_str(buf, key.as_str());
        encode_value(buf, value);
    }
}

fn write_envelope(buf: &mut Vec<u8>, envelope: &Envelope) {
    buf.push(tags::ENVELOPE);
    write_header(buf, &envelope.header);
    write_bytes(buf, &envelope.payload);
    write_map(buf, &envelope.footer);
}

fn write_map(buf: &mut Vec<u8>, pairs: &[(Value, Value)]) {
    write_counted(buf, tags::SHORT_MAP, tags::MAP, pairs.len());
    for (key, value) in pairs {
        encode_value(buf, key);
        encode_value(buf, value);
    }
}

fn write_message(buf: &mut Vec<u8>, message: &Message) {
    buf.push(tags::MESSAGE);
    write_str(buf, &message.path);
    match message.ticket_id {
        Some(ticket) => write_int(buf, i64::from(ticket)),
        None => buf.push(tags::NULL),
    }
    write_counted(buf, tags::SHORT_MAP, tags::MAP, message.body.len());
    for (key, value) in &message.body {
        write_str(buf, key);
        encode_value(buf, value);
    }
}

fn write_response(buf: &mut Vec<u8>, response: &Response) {
    buf.push(tags::RESPONSE);
    write_int(buf, i64::from(response.ticket_id));
    write_int(buf, response.status);
    write_str(buf, &response.message);
}
