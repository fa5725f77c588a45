//! Scratch memory for frame and message headers on the encode path.
//!
//! Every outbound message needs a small header buffer written before its
//! payload. Instead of allocating one per frame, a [`HeaderPool`] keeps a
//! single `BytesMut` arena: headers are written into the arena and split
//! off as frozen [`Bytes`], and the arena reclaims its capacity once the
//! writer task has flushed them and dropped the references.

use bytes::{Bytes, BytesMut};

/// Initial arena capacity. Headers are tens of bytes; this covers a
/// large batch of frames between reclaims.
pub const HEADER_POOL_CAPACITY: usize = 4 * 1024;

/// Reusable arena for encoding headers.
pub struct HeaderPool {
    scratch: BytesMut,
}

impl HeaderPool {
    pub fn new() -> Self {
        Self::with_capacity(HEADER_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scratch: BytesMut::with_capacity(capacity),
        }
    }

    /// Write one header through `write` and return it frozen.
    ///
    /// `reserve` is the number of bytes the closure will write; the
    /// arena grows (or reclaims flushed capacity) to fit it.
    pub fn encode_with(&mut self, reserve: usize, write: impl FnOnce(&mut BytesMut)) -> Bytes {
        self.scratch.reserve(reserve);
        write(&mut self.scratch);
        self.scratch.split().freeze()
    }

    /// Unused capacity currently held by the arena.
    pub fn remaining_capacity(&self) -> usize {
        self.scratch.capacity()
    }
}

impl Default for HeaderPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_encode_with_returns_exact_bytes() {
        let mut pool = HeaderPool::new();

        let header = pool.encode_with(9, |buf| {
            buf.put_u32(9);
            buf.put_u32(0xBADC_0FFE);
            buf.put_u8(5);
        });

        assert_eq!(header.len(), 9);
        assert_eq!(&header[4..8], &[0xBA, 0xDC, 0x0F, 0xFE]);
    }

    #[test]
    fn test_sequential_headers_are_independent() {
        let mut pool = HeaderPool::new();

        let first = pool.encode_with(4, |buf| buf.put_u32(1));
        let second = pool.encode_with(4, |buf| buf.put_u32(2));

        assert_eq!(&first[..], &[0, 0, 0, 1]);
        assert_eq!(&second[..], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_arena_reclaims_after_references_drop() {
        let mut pool = HeaderPool::with_capacity(64);

        for _ in 0..100 {
            let header = pool.encode_with(32, |buf| buf.put_slice(&[0xAB; 32]));
            assert_eq!(header.len(), 32);
            drop(header);
        }
        // Headers were dropped each round, so the arena never had to hold
        // more than one in flight.
    }

    #[test]
    fn test_large_header_grows_arena() {
        let mut pool = HeaderPool::with_capacity(16);
        let header = pool.encode_with(1024, |buf| buf.put_slice(&[0u8; 1024]));
        assert_eq!(header.len(), 1024);
    }
}
