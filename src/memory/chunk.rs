//! Arena chunks - one heap block holding a header and its data region
//!
//! Layout:
//! ```text
//! +----------------------+---------------------------+
//! | ChunkHeader          | data (len bytes)          |
//! | len | next           |                           |
//! +----------------------+---------------------------+
//! ^ allocation start      ^ data()                    ^ end()
//! ```
//!
//! A `Chunk` owns its block and, through `next`, the rest of its chain. The
//! handle is not `Clone`, so a chunk is reachable from exactly one owner: an
//! arena, a pool, or a chain link.

use core::fmt;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};

use super::chunk_pool::ChunkPools;
use crate::logging::error;

/// Fill byte for zapped chunk memory
pub const BAD_CHUNK_BYTE: u8 = 0xAB;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

#[repr(C)]
struct ChunkHeader {
    len: usize,
    next: Option<Chunk>,
    /// Reissued each time the chunk is handed to a new holder
    serial: u64,
}

const HEADER_SIZE: usize = size_of::<ChunkHeader>();

/// Identity of a chunk between two acquisitions
///
/// Combines the block address with a serial, so a chunk recycled through a
/// pool at the same address gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    addr: usize,
    serial: u64,
}

pub struct Chunk {
    header: NonNull<ChunkHeader>,
}

// Safety: a chunk is exclusively owned by a single holder, and moving it
// between threads moves the whole block with it.
unsafe impl Send for Chunk {}

impl Chunk {
    /// Allocate a chunk with `len` usable bytes
    ///
    /// Heap exhaustion aborts through `handle_alloc_error`; there is no
    /// recoverable failure path at this layer.
    pub fn new(len: usize) -> Self {
        let layout = Self::layout(len);

        let raw = unsafe { alloc(layout) } as *mut ChunkHeader;
        let Some(header) = NonNull::new(raw) else {
            error!(target: "vmcore::pool", len, "out of memory allocating arena chunk");
            handle_alloc_error(layout);
        };

        unsafe {
            header.as_ptr().write(ChunkHeader { len, next: None, serial: next_serial() });
        }

        Self { header }
    }

    /// Allocate and fill the data region with `BAD_CHUNK_BYTE`
    pub fn new_zapped(len: usize) -> Self {
        let mut chunk = Self::new(len);
        chunk.zap();
        chunk
    }

    fn layout(len: usize) -> Layout {
        HEADER_SIZE
            .checked_add(len)
            .and_then(|size| Layout::from_size_align(size, align_of::<ChunkHeader>()).ok())
            .unwrap_or_else(|| panic!("chunk length {} overflows the address space", len))
    }

    /// Usable capacity in bytes (header excluded)
    #[inline]
    pub fn len(&self) -> usize {
        unsafe { (*self.header.as_ptr()).len }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First byte of the data region
    #[inline]
    pub fn data(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((self.header.as_ptr() as *mut u8).add(HEADER_SIZE)) }
    }

    /// One past the last byte of the data region
    #[inline]
    pub fn end(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.data().as_ptr().add(self.len())) }
    }

    #[inline]
    pub fn id(&self) -> ChunkId {
        ChunkId {
            addr: self.header.as_ptr() as usize,
            serial: unsafe { (*self.header.as_ptr()).serial },
        }
    }

    /// Give the chunk a fresh id; called when a pooled chunk is reused
    pub(crate) fn restamp(&mut self) {
        unsafe { (*self.header.as_ptr()).serial = next_serial() };
    }

    /// True if `ptr` lies within `[data(), end())`
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.data().as_ptr() as usize && addr < self.end().as_ptr() as usize
    }

    #[inline]
    pub fn next(&self) -> Option<&Chunk> {
        unsafe { (*self.header.as_ptr()).next.as_ref() }
    }

    /// Detach and return the rest of the chain
    #[inline]
    pub fn take_next(&mut self) -> Option<Chunk> {
        unsafe { (*self.header.as_ptr()).next.take() }
    }

    /// Link `next` behind this chunk, returning whatever was linked before
    #[inline]
    pub fn replace_next(&mut self, next: Option<Chunk>) -> Option<Chunk> {
        unsafe { core::mem::replace(&mut (*self.header.as_ptr()).next, next) }
    }

    /// Iterate over this chunk and every chunk linked behind it
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter { cursor: Some(self) }
    }

    pub fn zap(&mut self) {
        unsafe {
            core::ptr::write_bytes(self.data().as_ptr(), BAD_CHUNK_BYTE, self.len());
        }
    }

    /// Release this chunk and its whole chain
    ///
    /// Each node goes back to the pool of its own size class, or to the heap
    /// when no class matches. Nodes are released newest first.
    pub fn chop(self, pools: &ChunkPools) {
        let mut cursor = Some(self);
        while let Some(mut chunk) = cursor {
            cursor = chunk.take_next();
            pools.release(chunk);
        }
    }

    /// Release every chunk linked behind this one, keeping this one
    pub fn next_chop(&mut self, pools: &ChunkPools) {
        if let Some(next) = self.take_next() {
            next.chop(pools);
        }
    }
}

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // Unlink iteratively so long chains do not recurse
        let mut next = self.take_next();
        while let Some(mut chunk) = next {
            next = chunk.take_next();
        }

        unsafe {
            dealloc(self.header.as_ptr() as *mut u8, Self::layout(self.len()));
        }
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("len", &self.len())
            .field("data", &self.data())
            .field("linked", &self.next().is_some())
            .finish()
    }
}

pub struct ChainIter<'a> {
    cursor: Option<&'a Chunk>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = current.next();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_follows_header() {
        let chunk = Chunk::new(128);
        let base = chunk.header.as_ptr() as usize;
        assert_eq!(chunk.data().as_ptr() as usize, base + HEADER_SIZE);
        assert_eq!(chunk.end().as_ptr() as usize - chunk.data().as_ptr() as usize, 128);
        assert_eq!(chunk.data().as_ptr() as usize % core::mem::size_of::<usize>(), 0);
    }

    #[test]
    fn data_region_is_writable() {
        let chunk = Chunk::new(64);
        unsafe {
            core::ptr::write_bytes(chunk.data().as_ptr(), 0x5A, 64);
            assert_eq!(*chunk.data().as_ptr().add(63), 0x5A);
        }
    }

    #[test]
    fn zapped_chunk_is_filled() {
        let chunk = Chunk::new_zapped(32);
        let bytes = unsafe { core::slice::from_raw_parts(chunk.data().as_ptr(), 32) };
        assert!(bytes.iter().all(|&b| b == BAD_CHUNK_BYTE));
    }

    #[test]
    fn contains_is_half_open() {
        let chunk = Chunk::new(16);
        assert!(chunk.contains(chunk.data().as_ptr()));
        assert!(!chunk.contains(chunk.end().as_ptr()));
    }

    #[test]
    fn chain_links_move_ownership() {
        let mut head = Chunk::new(8);
        let tail = Chunk::new(16);
        let tail_id = tail.id();

        assert!(head.replace_next(Some(tail)).is_none());
        assert_eq!(head.iter().count(), 2);
        assert_eq!(head.next().map(Chunk::id), Some(tail_id));

        let detached = head.take_next().expect("linked tail");
        assert_eq!(detached.id(), tail_id);
        assert!(head.next().is_none());
    }

    #[test]
    fn restamp_changes_id_but_not_memory() {
        let mut chunk = Chunk::new(32);
        let (id, data) = (chunk.id(), chunk.data());

        chunk.restamp();
        assert_ne!(chunk.id(), id);
        assert_eq!(chunk.data(), data);
    }

    #[test]
    fn long_chain_drops_without_recursion() {
        let mut head = Chunk::new(8);
        for _ in 0..100_000 {
            let mut node = Chunk::new(8);
            node.replace_next(Some(head));
            head = node;
        }
        assert_eq!(head.iter().count(), 100_001);
        drop(head);
    }
}
