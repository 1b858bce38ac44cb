//! VarInt encoding (LEB128) for Bysant length and count fields.
//!
//! Variable-length encoding where small values use fewer bytes:
//! - 0-127: 1 byte
//! - 128-16383: 2 bytes
//! - 16384-2097151: 3 bytes
//! - etc.

#![allow(missing_docs)]

/// Outcome of reading a varint from a possibly incomplete buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntRead {
    /// Decoded value and the number of bytes it used.
    Complete(u64, usize),
    /// The buffer ends inside the varint.
    Incomplete,
    /// More than 64 bits of payload.
    Overflow,
}

/// Write a variable-length integer to a Vec<u8>
pub fn write_varint_vec(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80; // Set continuation bit
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Read a variable-length integer from the start of a byte slice.
///
/// Running out of bytes is not an error here: the caller is expected to
/// wait for more input.
pub fn read_varint_slice(data: &[u8]) -> VarIntRead {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (pos, &byte) in data.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
            return VarIntRead::Overflow;
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return VarIntRead::Complete(result, pos + 1);
        }

        shift += 7;
    }

    VarIntRead::Incomplete
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint_size(value: u64) -> usize {
        if value == 0 {
            return 1;
        }
        let bits = 64 - value.leading_zeros() as usize;
        (bits + 6) / 7
    }

    #[test]
    fn test_varint_small() {
        let mut buf = Vec::new();
        write_varint_vec(&mut buf, 0);
        assert_eq!(buf, vec![0]);

        buf.clear();
        write_varint_vec(&mut buf, 127);
        assert_eq!(buf, vec![127]);
    }

    #[test]
    fn test_varint_medium() {
        let mut buf = Vec::new();
        write_varint_vec(&mut buf, 128);
        assert_eq!(buf, vec![0x80, 0x01]);

        buf.clear();
        write_varint_vec(&mut buf, 300);
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_varint_roundtrip() {
        for &value in &[0, 1, 127, 128, 16383, 16384, 2097151, 2097152, u64::MAX] {
            let mut buf = Vec::new();
            write_varint_vec(&mut buf, value);
            assert_eq!(
                read_varint_slice(&buf),
                VarIntRead::Complete(value, buf.len()),
                "Roundtrip failed for value {}",
                value
            );
            assert_eq!(buf.len(), varint_size(value));
        }
    }

    #[test]
    fn test_varint_incomplete() {
        assert_eq!(read_varint_slice(&[]), VarIntRead::Incomplete);
        assert_eq!(read_varint_slice(&[0x80, 0x80]), VarIntRead::Incomplete);
    }

    #[test]
    fn test_varint_overflow() {
        let too_long = [0xFF; 11];
        assert_eq!(read_varint_slice(&too_long), VarIntRead::Overflow);

        let mut tenth_byte_too_big = vec![0xFF; 9];
        tenth_byte_too_big.push(0x02);
        assert_eq!(read_varint_slice(&tenth_byte_too_big), VarIntRead::Overflow);
    }

    #[test]
    fn test_varint_trailing_data() {
        let mut buf = Vec::new();
        write_varint_vec(&mut buf, 12345);
        buf.extend_from_slice(b"extra data");

        match read_varint_slice(&buf) {
            VarIntRead::Complete(value, consumed) => {
                assert_eq!(value, 12345);
                assert_eq!(consumed, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
