//! Protocol implementations.
//!
//! - `resp`: Redis RESP protocol frames, decoder and encoder

pub mod resp;
