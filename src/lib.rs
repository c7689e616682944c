//! respio: buffered, deadline-aware RESP transport.
//!
//! Layers, bottom up:
//! - `buffer`: fixed-size byte buffers, optionally from an external allocator
//!   under a process-wide byte budget
//! - `bufio`: buffered reader and writer with sticky errors
//! - `protocols::resp`: RESP frames, decoder and encoder
//! - `runtime`: TCP connections with deadlines and batched flushing

pub mod buffer;
pub mod bufio;
pub mod error;
pub mod protocols;
pub mod runtime;

pub use error::{Error, Result};
