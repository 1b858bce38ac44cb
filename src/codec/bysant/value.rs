//! Bysant value model.

use std::fmt;

use base64::Engine as _;

use super::vector::{DeltaVector, Number, QuasiPeriodicVector};
use crate::codec::pdu::Pdu;

/// Ordered key/value pairs. Insertion order is kept on the wire.
pub type Map = Vec<(Value, Value)>;

/// Any value the Bysant codec can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absence of value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer; encoded in the narrowest width that holds it
    Int(i64),
    /// Floating point; encoded as float32 when lossless
    Float(f64),
    /// Opaque byte string
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Ordered list
    List(Vec<Value>),
    /// Ordered map
    Map(Map),
    /// Delta-compressed numeric sequence
    DeltaVector(DeltaVector),
    /// Quasi-periodic numeric sequence
    QuasiPeriodicVector(QuasiPeriodicVector),
    /// Nested protocol data unit
    Pdu(Box<Pdu>),
}

impl Value {
    /// Short variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bytes(_) => "bytes",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::DeltaVector(_) => "delta vector",
            Self::QuasiPeriodicVector(_) => "quasi-periodic vector",
            Self::Pdu(pdu) => pdu.kind(),
        }
    }

    /// Numeric view of an integer or float.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text view of a string, or of a byte string holding UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Raw bytes of a byte string or string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Flat sample list of a numeric vector or a list of numbers.
    pub fn to_samples(&self) -> Option<Vec<Number>> {
        match self {
            Self::DeltaVector(v) => Some(v.flatten()),
            Self::QuasiPeriodicVector(v) => Some(v.flatten()),
            Self::List(items) => items.iter().map(Value::as_number).collect(),
            _ => None,
        }
    }

    /// JSON rendering for the admin API.
    ///
    /// Byte strings holding UTF-8 become JSON strings; other byte strings
    /// become `{"base64": "..."}`. Vectors are flattened.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        fn number(n: Number) -> Json {
            match n {
                Number::Int(i) => Json::from(i),
                Number::Float(f) => Json::from(f),
            }
        }

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => Json::from(*f),
            Self::String(s) => Json::String(s.clone()),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => Json::String(s.to_string()),
                Err(_) => serde_json::json!({
                    "base64": base64::engine::general_purpose::STANDARD.encode(b)
                }),
            },
            Self::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Self::Map(pairs) => {
                let object = pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k.as_text() {
                            Some(text) => text.to_string(),
                            None => k.to_string(),
                        };
                        (key, v.to_json())
                    })
                    .collect();
                Json::Object(object)
            }
            Self::DeltaVector(v) => Json::Array(v.samples().map(number).collect()),
            Self::QuasiPeriodicVector(v) => Json::Array(v.samples().map(number).collect()),
            Self::Pdu(pdu) => Json::String(pdu.kind().to_string()),
        }
    }

    /// Build a value from JSON sent to the admin API.
    ///
    /// JSON strings become byte strings, which is how devices expect text
    /// settings to arrive.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Self::Bytes(s.as_bytes().to_vec()),
            Json::Array(items) => Self::List(items.iter().map(Value::from_json).collect()),
            Json::Object(object) => Self::Map(
                object
                    .iter()
                    .map(|(k, v)| (Self::String(k.clone()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            other => write!(f, "<{}>", other.kind()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        match value {
            Number::Int(i) => Self::Int(i),
            Number::Float(f) => Self::Float(f),
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<DeltaVector> for Value {
    fn from(value: DeltaVector) -> Self {
        Self::DeltaVector(value)
    }
}

impl From<QuasiPeriodicVector> for Value {
    fn from(value: QuasiPeriodicVector) -> Self {
        Self::QuasiPeriodicVector(value)
    }
}

impl From<Pdu> for Value {
    fn from(value: Pdu) -> Self {
        Self::Pdu(Box::new(value))
    }
}
