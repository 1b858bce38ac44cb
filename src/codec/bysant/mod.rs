//! Bysant: the compact tagged value encoding underneath every M3DA PDU.
//!
//! | Component  | Role                                              |
//! |------------|---------------------------------------------------|
//! | [`tags`]   | Frozen tag table and decoder limits               |
//! | [`Value`]  | Closed sum type over every encodable value        |
//! | vectors    | Delta and quasi-periodic compressed sequences     |
//! | encoder    | `Value` to bytes                                  |
//! | decoder    | Resumable bytes to `Value` over arbitrary chunks  |

mod decoder;
mod encoder;
pub mod tags;
mod value;
mod vector;

pub use decoder::{decode, BysantDecoder, DecoderOutput};
pub use encoder::{encode, encode_all, encode_pdu, encode_value};
pub use value::{Map, Value};
pub use vector::{DeltaVector, Number, QuasiPeriodicVector, ShiftsError};
