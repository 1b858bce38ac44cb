//! Conversion of received messages into time-stamped store data.
//!
//! A message body holding at least one series (list or numeric vector) is
//! correlated data: its keys are columns of the same samples. When it also
//! carries a `timestamp` (or `timestamps`) column, given in seconds, each
//! sample gets the matching time; samples past the end of that column get
//! the previous time plus one millisecond. Any other body is stamped with
//! the reception time.

use std::collections::BTreeMap;

use super::{DataValue, ReceivedMessage};
use crate::codec::bysant::{Number, Value};
use crate::codec::pdu::Message;

const TIMESTAMP_KEYS: [&str; 2] = ["timestamp", "timestamps"];

impl ReceivedMessage {
    /// Convert a decoded message received at `now_ms`.
    pub fn from_message(message: &Message, now_ms: i64) -> Self {
        let correlated = message.body.values().any(is_series);
        let timestamps = TIMESTAMP_KEYS
            .iter()
            .find_map(|key| message.body.get(*key))
            .filter(|_| correlated)
            .map(timestamps_ms);

        let data = match timestamps {
            Some(timestamps) => {
                tracing::debug!(path = %message.path, "timestamped correlated data");
                timestamped(message, &timestamps, now_ms)
            }
            None => message
                .body
                .iter()
                .map(|(key, value)| {
                    let samples = extract_list(value)
                        .into_iter()
                        .map(|v| DataValue::new(now_ms, v))
                        .collect();
                    (key.clone(), samples)
                })
                .collect(),
        };

        Self {
            path: message.path.clone(),
            data,
        }
    }
}

fn timestamped(
    message: &Message,
    timestamps: &[i64],
    now_ms: i64,
) -> BTreeMap<String, Vec<DataValue>> {
    message
        .body
        .iter()
        .filter(|(key, _)| !TIMESTAMP_KEYS.contains(&key.as_str()))
        .map(|(key, value)| {
            let mut last = now_ms;
            let samples = extract_list(value)
                .into_iter()
                .enumerate()
                .map(|(index, v)| {
                    last = match timestamps.get(index) {
                        Some(&ts) => ts,
                        None => last + 1,
                    };
                    DataValue::new(last, v)
                })
                .collect();
            (key.clone(), samples)
        })
        .collect()
}

fn is_series(value: &Value) -> bool {
    matches!(
        value,
        Value::List(_) | Value::DeltaVector(_) | Value::QuasiPeriodicVector(_)
    )
}

/// Timestamp column in milliseconds. Non-numeric entries are skipped.
fn timestamps_ms(value: &Value) -> Vec<i64> {
    extract_list(value)
        .iter()
        .filter_map(Value::as_number)
        .map(|n| match n {
            Number::Int(s) => s.saturating_mul(1000),
            Number::Float(s) => (s * 1000.0) as i64,
        })
        .collect()
}

/// Samples of a value: series are flattened, scalars stand alone, and
/// UTF-8 byte strings become text.
fn extract_list(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.iter().map(textify).collect(),
        Value::DeltaVector(v) => v.samples().map(Value::from).collect(),
        Value::QuasiPeriodicVector(v) => v.samples().map(Value::from).collect(),
        other => vec![textify(other)],
    }
}

fn textify(value: &Value) -> Value {
    match value {
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => value.clone(),
        },
        other => other.clone(),
    }
}
