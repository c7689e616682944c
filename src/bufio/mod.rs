//! Buffered byte streams.
//!
//! [`Reader`] and [`Writer`] wrap any `std::io` source or sink with a single
//! fixed-size buffer taken from the [buffer allocator](crate::buffer). Both
//! latch the first error they see, so a stream known to be broken is never
//! touched again.

mod chunk;
mod reader;
mod writer;

pub use chunk::SliceAlloc;
pub use reader::{Reader, READ_FULL_STEP};
pub use writer::Writer;

/// Buffer size used when none (or zero) is given.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;
