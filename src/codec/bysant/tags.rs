//! Frozen Bysant tag table.
//!
//! ```text
//! 0x00            null
//! 0x01 / 0x02     true / false
//! 0x03..=0x22     string, length 0..=31 in the tag
//! 0x23            string, varint length
//! 0x24..=0x43     bytes, length 0..=31 in the tag
//! 0x44            bytes, varint length
//! 0x45..=0x54     list, 0..=15 items in the tag
//! 0x55            list, varint count
//! 0x56..=0x65     map, 0..=15 pairs in the tag
//! 0x66            map, varint count
//! 0x67..=0x6A     int8 / int16 / int32 / int64 (big endian)
//! 0x6B / 0x6C     float32 / float64 (big endian)
//! 0x6D            delta vector
//! 0x6E            quasi-periodic vector
//! 0x6F..=0x71     envelope / message / response
//! 0x72..=0x7F     reserved
//! 0x80..=0xFF     small int, value = tag - 0xC0 (-64..=63)
//! ```

#![allow(missing_docs)]

pub const NULL: u8 = 0x00;
pub const TRUE: u8 = 0x01;
pub const FALSE: u8 = 0x02;

pub const SHORT_STRING: u8 = 0x03;
pub const STRING: u8 = 0x23;
pub const SHORT_BYTES: u8 = 0x24;
pub const BYTES: u8 = 0x44;
pub const SHORT_LIST: u8 = 0x45;
pub const LIST: u8 = 0x55;
pub const SHORT_MAP: u8 = 0x56;
pub const MAP: u8 = 0x66;

/// Largest length that fits in a short string or bytes tag.
pub const SHORT_LEN_MAX: usize = 31;
/// Largest count that fits in a short list or map tag.
pub const SHORT_COUNT_MAX: usize = 15;

pub const INT8: u8 = 0x67;
pub const INT16: u8 = 0x68;
pub const INT32: u8 = 0x69;
pub const INT64: u8 = 0x6A;
pub const FLOAT32: u8 = 0x6B;
pub const FLOAT64: u8 = 0x6C;

pub const DELTA_VECTOR: u8 = 0x6D;
pub const QUASI_PERIODIC_VECTOR: u8 = 0x6E;

pub const ENVELOPE: u8 = 0x6F;
pub const MESSAGE: u8 = 0x70;
pub const RESPONSE: u8 = 0x71;

pub const SMALL_INT_FIRST: u8 = 0x80;
/// Bias subtracted from a small-int tag to get its value.
pub const SMALL_INT_BIAS: i64 = 0xC0;
pub const SMALL_INT_MIN: i64 = -64;
pub const SMALL_INT_MAX: i64 = 63;

/// Upper bound on any length or count field.
pub const MAX_LENGTH: usize = 64 * 1024 * 1024;
/// Upper bound on container nesting.
pub const MAX_DEPTH: usize = 64;
/// Upper bound on the number of samples a compressed vector may expand to.
pub const MAX_VECTOR_SAMPLES: usize = 16 * 1024 * 1024;
