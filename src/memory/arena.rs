//! Arenas - chunk-backed bump allocation with mark/restore
//!
//! Design: three layers, fastest first:
//! 1. Bump `begin` toward `end` inside the active chunk (O(1), no search)
//! 2. On exhaustion, take a chunk sized by the size-class policy from the
//!    pools (or the heap) and make it the new head of the chain
//! 3. On restore or drop, hand chunks back to the pools in one sweep
//!
//! Individual frees are not supported beyond rewinding the most recent
//! allocation. Memory handed out is never zeroed.
//!
//! An arena is not synchronized; use one per thread or guard it externally.

use core::fmt;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

use super::align::{align_up, WORD_SIZE};
use super::chunk::{Chunk, ChunkId, BAD_CHUNK_BYTE};
use super::chunk_pool::ChunkPools;
use super::size_class::{ChunkClass, INIT_SIZE};
use crate::logging::{log_arena_grown, log_arena_restored};

static NEXT_ARENA_ID: AtomicUsize = AtomicUsize::new(1);

pub struct Arena<'p> {
    pools: &'p ChunkPools,
    /// Active chunk, head of the chain; older chunks hang off `next`
    chunk: ManuallyDrop<Chunk>,
    /// Next free byte in the active chunk
    begin: *mut u8,
    /// One past the active chunk's data region
    end: *mut u8,
    size_in_bytes: usize,
    chunk_count: usize,
    id: usize,
}

// Safety: the arena exclusively owns its chain; the cursors only point into it.
unsafe impl Send for Arena<'_> {}

/// Snapshot of an arena's allocation state
///
/// Valid only for the arena that produced it, and only until that arena
/// is restored to an earlier mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMark {
    arena: usize,
    chunk: ChunkId,
    begin: usize,
}

/// Arena statistics for monitoring and debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub size_in_bytes: usize,
    pub chunk_count: usize,
    pub active_chunk_len: usize,
    pub remaining: usize,
}

impl Arena<'static> {
    /// Create an arena drawing from the process-wide pools
    pub fn new(init_size: usize) -> Self {
        Self::with_pools(ChunkPools::global(), init_size)
    }
}

impl Default for Arena<'static> {
    fn default() -> Self {
        Self::new(INIT_SIZE)
    }
}

impl<'p> Arena<'p> {
    /// Create an arena whose first chunk holds `init_size` bytes (rounded up
    /// to a word)
    ///
    /// The first chunk is recycled from `pools` when the rounded size is a
    /// class size, otherwise freshly allocated.
    pub fn with_pools(pools: &'p ChunkPools, init_size: usize) -> Self {
        let len = word_align(init_size);
        let chunk = pools.acquire(len);
        let begin = chunk.data().as_ptr();
        let end = chunk.end().as_ptr();

        Self {
            pools,
            chunk: ManuallyDrop::new(chunk),
            begin,
            end,
            size_in_bytes: len,
            chunk_count: 1,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn pools(&self) -> &'p ChunkPools {
        self.pools
    }

    /// Allocate `size` bytes (fast path: bump pointer)
    ///
    /// The returned memory is uninitialized. Heap exhaustion while growing
    /// aborts the process.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> NonNull<u8> {
        if self.remaining() < size {
            self.grow(size);
        }
        self.bump(size)
    }

    /// Allocate `size` bytes starting on an `align` boundary
    pub fn alloc_aligned(&mut self, size: usize, align: usize) -> NonNull<u8> {
        assert!(align.is_power_of_two(), "alignment must be power of 2");

        let mut padding = align_up(self.begin as usize, align) - self.begin as usize;
        if self.remaining() < padding.saturating_add(size) {
            let request = size
                .checked_add(align - 1)
                .unwrap_or_else(|| panic!("arena request of {} bytes overflows", size));
            self.grow(request);
            padding = align_up(self.begin as usize, align) - self.begin as usize;
        }

        self.begin = self.begin.wrapping_add(padding);
        self.bump(size)
    }

    #[inline(always)]
    fn bump(&mut self, size: usize) -> NonNull<u8> {
        debug_assert!(self.remaining() >= size);
        let ptr = self.begin;
        self.begin = unsafe { ptr.add(size) };
        unsafe { NonNull::new_unchecked(ptr) }
    }

    /// Slow path: link a new active chunk able to hold `request` bytes
    ///
    /// The new chunk is the smallest class that fits, or exactly the
    /// (word-aligned) request when it exceeds the largest class.
    #[cold]
    fn grow(&mut self, request: usize) {
        let len = match ChunkClass::for_request(request) {
            Some(class) => class.size(),
            None => word_align(request),
        };

        let fresh = self.pools.acquire(len);
        let previous = core::mem::replace(&mut *self.chunk, fresh);
        self.chunk.replace_next(Some(previous));

        self.begin = self.chunk.data().as_ptr();
        self.end = self.chunk.end().as_ptr();
        self.size_in_bytes += len;
        self.chunk_count += 1;

        log_arena_grown(request, len, self.chunk_count);
    }

    /// Give back the most recent allocation
    ///
    /// Only `ptr` with `ptr + size` equal to the bump cursor is reclaimed;
    /// anything else is left alone. Returns whether memory was reclaimed.
    pub fn try_free(&mut self, ptr: NonNull<u8>, size: usize) -> bool {
        let addr = ptr.as_ptr() as usize;
        if !self.is_top(addr, size) {
            return false;
        }

        self.begin = ptr.as_ptr();
        true
    }

    /// Resize an allocation
    ///
    /// The most recent allocation is resized in place when the active chunk
    /// has room. Otherwise a new block is allocated and the first
    /// `min(old_size, new_size)` bytes copied; the old block stays until its
    /// chunk is released.
    ///
    /// # Safety
    /// `ptr` must come from this arena and be valid for `old_size` bytes.
    pub unsafe fn realloc(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> NonNull<u8> {
        let addr = ptr.as_ptr() as usize;
        if self.is_top(addr, old_size) && new_size <= self.end as usize - addr {
            self.begin = ptr.as_ptr().add(new_size);
            return ptr;
        }

        let fresh = self.alloc(new_size);
        ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old_size.min(new_size));
        fresh
    }

    /// True if `[addr, addr + size)` ends exactly at the bump cursor
    #[inline]
    fn is_top(&self, addr: usize, size: usize) -> bool {
        addr >= self.chunk.data().as_ptr() as usize
            && addr.checked_add(size) == Some(self.begin as usize)
    }

    /// Snapshot the current allocation state
    pub fn mark(&self) -> ArenaMark {
        ArenaMark {
            arena: self.id,
            chunk: self.chunk.id(),
            begin: self.begin as usize,
        }
    }

    /// Discard everything allocated since `mark`
    ///
    /// Chunks acquired after the mark go back to their pools (or the heap)
    /// and the marked chunk becomes active again with its cursor rewound.
    ///
    /// # Panics
    /// If `mark` came from another arena or its chunk has already been
    /// released by an earlier restore.
    pub fn restore(&mut self, mark: ArenaMark) {
        assert_eq!(mark.arena, self.id, "arena mark restored on a different arena");

        let mut released = 0;
        while self.chunk.id() != mark.chunk {
            let next = self
                .chunk
                .take_next()
                .unwrap_or_else(|| panic!("arena mark refers to a chunk this arena no longer owns"));
            let dead = core::mem::replace(&mut *self.chunk, next);

            self.size_in_bytes -= dead.len();
            self.chunk_count -= 1;
            self.pools.release(dead);
            released += 1;
        }

        let data = self.chunk.data().as_ptr() as usize;
        let end = self.chunk.end().as_ptr() as usize;
        assert!(
            (data..=end).contains(&mark.begin),
            "arena mark cursor lies outside its chunk"
        );

        self.begin = mark.begin as *mut u8;
        self.end = self.chunk.end().as_ptr();

        if self.pools.zaps() {
            unsafe { ptr::write_bytes(self.begin, BAD_CHUNK_BYTE, self.remaining()) };
        }

        log_arena_restored(released, self.chunk_count);
    }

    /// Free bytes left in the active chunk
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end as usize - self.begin as usize
    }

    /// Total capacity of every chunk in the chain
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Length of the active chunk
    #[inline]
    pub fn active_chunk_len(&self) -> usize {
        self.chunk.len()
    }

    /// True if `ptr` points into memory this arena has handed out
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let head = &*self.chunk;
        if addr >= head.data().as_ptr() as usize && addr < self.begin as usize {
            return true;
        }
        head.iter().skip(1).any(|chunk| chunk.contains(ptr))
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            size_in_bytes: self.size_in_bytes,
            chunk_count: self.chunk_count,
            active_chunk_len: self.chunk.len(),
            remaining: self.remaining(),
        }
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        // Safety: `chunk` is never touched again after this point
        let chain = unsafe { ManuallyDrop::take(&mut self.chunk) };
        chain.chop(self.pools);
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("chunk_count", &self.chunk_count)
            .field("size_in_bytes", &self.size_in_bytes)
            .field("remaining", &self.remaining())
            .finish()
    }
}

fn word_align(size: usize) -> usize {
    size.checked_add(WORD_SIZE - 1)
        .map(|padded| padded & !(WORD_SIZE - 1))
        .unwrap_or_else(|| panic!("arena request of {} bytes overflows", size))
}
