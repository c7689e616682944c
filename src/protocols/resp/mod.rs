//! RESP (Redis Serialization Protocol) implementation.
//!
//! RESP2 only: simple strings, errors, integers, bulk strings and arrays.

mod decoder;
mod encoder;
mod frame;

pub use decoder::{
    decode_all, decode_from, Decoder, MAX_ARRAY_LEN, MAX_BULK_BYTES_LEN, MAX_NESTING_DEPTH,
};
pub use encoder::{encode_to_bytes, Encoder};
pub use frame::{Frame, RespType, CRLF};
