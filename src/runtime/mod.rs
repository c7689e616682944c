//! Blocking network runtime.
//!
//! - `Connection`: a TCP stream bound to a RESP decoder and encoder, with
//!   per-operation read and write deadlines
//! - `FlushEncoder`: batches encoded frames into fewer socket writes

mod connection;
mod flush;

pub use connection::{listen, ConnReader, ConnWriter, Connection, ReadHalf, WriteHalf};
pub use flush::FlushEncoder;
