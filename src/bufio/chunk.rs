//! Carves small owned byte buffers out of shared blocks.

use bytes::BytesMut;

/// Size of each shared block.
const CHUNK_SIZE: usize = 8 * 1024;

/// Requests larger than this get a dedicated allocation.
const MAX_CARVED: usize = 512;

/// Chunked allocator for buffers returned by value from a reader.
///
/// Small requests are split off the front of one shared block, so decoding
/// many short lines costs one allocation per block instead of one per line.
/// Each returned buffer keeps its block alive until it is dropped.
#[derive(Debug, Default)]
pub struct SliceAlloc {
    block: BytesMut,
}

impl SliceAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zeroed buffer of exactly `len` bytes.
    pub fn make(&mut self, len: usize) -> BytesMut {
        if len > MAX_CARVED {
            return BytesMut::zeroed(len);
        }
        if self.block.len() < len {
            self.block = BytesMut::zeroed(CHUNK_SIZE);
        }
        self.block.split_to(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_buffers_share_a_block() {
        let mut alloc = SliceAlloc::new();

        let mut a = alloc.make(10);
        let mut b = alloc.make(20);
        assert_eq!(a.len(), 10);
        assert_eq!(b.len(), 20);

        a.copy_from_slice(b"0123456789");
        b[..5].copy_from_slice(b"hello");
        let a = a.freeze();
        assert_eq!(&a[..], b"0123456789");
        assert_eq!(&b[..5], b"hello");
        // b starts where a ends inside the same block.
        assert_eq!(unsafe { a.as_ptr().add(10) }, b.as_ptr());
    }

    #[test]
    fn test_block_is_replaced_when_exhausted() {
        let mut alloc = SliceAlloc::new();
        let mut total = 0;
        while total + MAX_CARVED <= CHUNK_SIZE {
            assert_eq!(alloc.make(MAX_CARVED).len(), MAX_CARVED);
            total += MAX_CARVED;
        }
        let next = alloc.make(MAX_CARVED);
        assert_eq!(next.len(), MAX_CARVED);
        assert!(next.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_large_request_is_dedicated() {
        let mut alloc = SliceAlloc::new();
        let big = alloc.make(MAX_CARVED + 1);
        assert_eq!(big.len(), MAX_CARVED + 1);
    }
}
