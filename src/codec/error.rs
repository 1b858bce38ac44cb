//! Decode errors for the Bysant value codec and the envelope codec.
//!
//! Every variant that points at a malformed byte carries the absolute
//! stream offset of that byte, counted from the first byte ever fed to the
//! decoder. Offsets stay meaningful across chunk boundaries.

use thiserror::Error;

/// Fatal decode failure.
///
/// A decoder that returned one of these is poisoned: later calls return the
/// same error again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Tag byte outside the frozen tag table.
    #[error("invalid tag 0x{tag:02x} at offset {offset}")]
    InvalidTag { tag: u8, offset: usize },

    /// Length or count field larger than the decoder accepts.
    #[error("length {length} at offset {offset} exceeds limit {limit}")]
    LengthOverflow {
        length: u64,
        limit: usize,
        offset: usize,
    },

    /// VarInt longer than 64 bits.
    #[error("varint overflow at offset {offset}")]
    VarIntOverflow { offset: usize },

    /// A well-formed value of the wrong variant where a specific one is required.
    #[error("expected {expected} at offset {offset}, found {found}")]
    WrongType {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    /// String payload is not UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Containers nested deeper than the decoder accepts.
    #[error("nesting deeper than {limit} at offset {offset}")]
    TooDeep { limit: usize, offset: usize },

    /// Compressed vector expands to more samples than allowed.
    #[error("vector at offset {offset} expands past {limit} samples")]
    VectorTooLarge { limit: usize, offset: usize },

    /// Top-level value is not an envelope.
    #[error("parasite data at offset {offset}: expected an envelope, found {found}")]
    ParasiteData { found: &'static str, offset: usize },

    /// `finish_decode` was called while an incomplete value was buffered.
    #[error("{remaining} trailing bytes do not form a complete value")]
    TrailingBytes { remaining: usize },

    /// Envelope decoder already produced its envelope.
    #[error("envelope decoder already emitted an envelope and cannot be reused")]
    DecoderReused,

    /// Decoder was used after `finish_decode`.
    #[error("decoder already finished")]
    Finished,
}

impl DecodeError {
    /// Byte offset of the offending input, when the error points at one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::InvalidTag { offset, .. }
            | Self::LengthOverflow { offset, .. }
            | Self::VarIntOverflow { offset }
            | Self::WrongType { offset, .. }
            | Self::InvalidUtf8 { offset }
            | Self::TooDeep { offset, .. }
            | Self::VectorTooLarge { offset, .. }
            | Self::ParasiteData { offset, .. } => Some(*offset),
            Self::TrailingBytes { .. } | Self::DecoderReused | Self::Finished => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_reported() {
        let err = DecodeError::InvalidTag {
            tag: 0x72,
            offset: 17,
        };
        assert_eq!(err.offset(), Some(17));
        assert_eq!(err.to_string(), "invalid tag 0x72 at offset 17");
    }

    #[test]
    fn test_offset_absent_for_stream_errors() {
        assert_eq!(DecodeError::DecoderReused.offset(), None);
        assert_eq!(DecodeError::TrailingBytes { remaining: 3 }.offset(), None);
    }
}
