//! Chunk pools - free lists of same-size chunks recycled across arenas
//!
//! Design: one LIFO stack per size class, each behind a short
//! `parking_lot::Mutex` critical section. Pools are typed by their class, so
//! only a `ClassChunk<C>` (a chunk proven to have length `C::SIZE`) can be
//! pushed into a `ChunkPool<C>`.
//!
//! `ChunkPools` groups the four pools into one context that arenas borrow.
//! Tests create isolated instances; everything else shares `global()`.

use core::fmt;
use core::marker::PhantomData;

use once_cell::sync::OnceCell;
use parking_lot::{const_mutex, Mutex};

use super::chunk::Chunk;
use super::size_class::{ChunkClass, Init, Large, Medium, SizeClass, Tiny};
use crate::logging::{debug, trace};

/// Process-wide pools, created on first use or by `memory::init`
static GLOBAL_POOLS: OnceCell<ChunkPools> = OnceCell::new();

/// A chunk whose length is statically known to equal `C::SIZE`
pub struct ClassChunk<C: SizeClass> {
    chunk: Chunk,
    _class: PhantomData<C>,
}

impl<C: SizeClass> ClassChunk<C> {
    /// Prove a chunk belongs to class `C`, handing it back on mismatch
    ///
    /// Chunks still linked to a chain are rejected as well; pools hold
    /// single chunks only.
    pub fn try_from_chunk(chunk: Chunk) -> Result<Self, Chunk> {
        if chunk.len() == C::SIZE && chunk.next().is_none() {
            Ok(Self { chunk, _class: PhantomData })
        } else {
            Err(chunk)
        }
    }

    /// Allocate a fresh chunk of this class
    pub fn allocate() -> Self {
        Self { chunk: Chunk::new(C::SIZE), _class: PhantomData }
    }

    #[inline]
    pub fn into_chunk(self) -> Chunk {
        self.chunk
    }

    #[inline]
    pub fn as_chunk(&self) -> &Chunk {
        &self.chunk
    }
}

impl<C: SizeClass> fmt::Debug for ClassChunk<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassChunk").field(&C::CLASS).field(&self.chunk).finish()
    }
}

/// LIFO free list for one size class
pub struct ChunkPool<C: SizeClass> {
    top: Mutex<Option<Chunk>>,
    _class: PhantomData<C>,
}

impl<C: SizeClass> ChunkPool<C> {
    pub const fn new() -> Self {
        Self {
            top: const_mutex(None),
            _class: PhantomData,
        }
    }

    #[inline]
    pub fn class(&self) -> ChunkClass {
        C::CLASS
    }

    pub fn push(&self, chunk: ClassChunk<C>) {
        let mut chunk = chunk.into_chunk();
        let mut top = self.top.lock();
        let previous = top.take();
        chunk.replace_next(previous);
        *top = Some(chunk);
    }

    pub fn pop(&self) -> Option<ClassChunk<C>> {
        let mut top = self.top.lock();
        let mut chunk = top.take()?;
        *top = chunk.take_next();
        Some(ClassChunk { chunk, _class: PhantomData })
    }

    pub fn is_empty(&self) -> bool {
        self.top.lock().is_none()
    }

    /// Number of pooled chunks (walks the stack under the lock)
    pub fn len(&self) -> usize {
        self.top.lock().as_ref().map_or(0, |top| top.iter().count())
    }

    /// Free every pooled chunk to the heap, returning how many were freed
    pub fn clear(&self) -> usize {
        let stack = self.top.lock().take();
        let freed = stack.as_ref().map_or(0, |top| top.iter().count());
        drop(stack);
        freed
    }
}

impl<C: SizeClass> Default for ChunkPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SizeClass> fmt::Debug for ChunkPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkPool")
            .field("class", &C::CLASS)
            .field("len", &self.len())
            .finish()
    }
}

/// The set of pools an arena draws chunks from and returns them to
#[derive(Debug)]
pub struct ChunkPools {
    tiny: ChunkPool<Tiny>,
    init: ChunkPool<Init>,
    medium: ChunkPool<Medium>,
    large: ChunkPool<Large>,
    zap: bool,
}

impl ChunkPools {
    /// Empty pools; zapping follows the build profile
    pub const fn new() -> Self {
        Self::with_zap(cfg!(debug_assertions))
    }

    /// Empty pools, filling new and released chunks with a marker byte if `zap`
    pub const fn with_zap(zap: bool) -> Self {
        Self {
            tiny: ChunkPool::new(),
            init: ChunkPool::new(),
            medium: ChunkPool::new(),
            large: ChunkPool::new(),
            zap,
        }
    }

    /// The process-wide pools
    pub fn global() -> &'static ChunkPools {
        GLOBAL_POOLS.get_or_init(ChunkPools::new)
    }

    /// Create the process-wide pools with the given zapping policy
    ///
    /// Has no effect if they already exist.
    pub(crate) fn init_global(zap: bool) -> &'static ChunkPools {
        GLOBAL_POOLS.get_or_init(|| ChunkPools::with_zap(zap))
    }

    #[inline]
    pub fn zaps(&self) -> bool {
        self.zap
    }

    pub fn tiny(&self) -> &ChunkPool<Tiny> {
        &self.tiny
    }

    pub fn init(&self) -> &ChunkPool<Init> {
        &self.init
    }

    pub fn medium(&self) -> &ChunkPool<Medium> {
        &self.medium
    }

    pub fn large(&self) -> &ChunkPool<Large> {
        &self.large
    }

    /// Obtain a chunk of exactly `len` bytes, recycling a pooled one when
    /// `len` is a class size
    pub fn acquire(&self, len: usize) -> Chunk {
        let pooled = match ChunkClass::for_exact(len) {
            Some(ChunkClass::Tiny) => self.tiny.pop().map(ClassChunk::into_chunk),
            Some(ChunkClass::Init) => self.init.pop().map(ClassChunk::into_chunk),
            Some(ChunkClass::Medium) => self.medium.pop().map(ClassChunk::into_chunk),
            Some(ChunkClass::Large) => self.large.pop().map(ClassChunk::into_chunk),
            None => None,
        };

        match pooled {
            Some(mut chunk) => {
                chunk.restamp();
                trace!(target: "vmcore::pool", len, "recycled pooled chunk");
                chunk
            }
            None => {
                trace!(target: "vmcore::pool", len, "allocated fresh chunk");
                if self.zap {
                    Chunk::new_zapped(len)
                } else {
                    Chunk::new(len)
                }
            }
        }
    }

    /// Return a single chunk (its chain must already be detached) to the
    /// pool matching its length, or free it when no pool matches
    pub fn release(&self, mut chunk: Chunk) {
        debug_assert!(chunk.next().is_none(), "release takes a single chunk");
        if self.zap {
            chunk.zap();
        }

        let len = chunk.len();
        let leftover = Self::offer(&self.tiny, chunk)
            .and_then(|c| Self::offer(&self.init, c))
            .and_then(|c| Self::offer(&self.medium, c))
            .and_then(|c| Self::offer(&self.large, c));

        match leftover {
            None => trace!(target: "vmcore::pool", len, "chunk returned to pool"),
            Some(chunk) => {
                trace!(target: "vmcore::pool", len, "oversized chunk freed to heap");
                drop(chunk);
            }
        }
    }

    /// Release a whole chain, newest first
    pub fn release_chain(&self, chain: Chunk) {
        chain.chop(self);
    }

    fn offer<C: SizeClass>(pool: &ChunkPool<C>, chunk: Chunk) -> Option<Chunk> {
        match ClassChunk::<C>::try_from_chunk(chunk) {
            Ok(classed) => {
                pool.push(classed);
                None
            }
            Err(chunk) => Some(chunk),
        }
    }

    /// Number of chunks currently pooled for `class`
    pub fn pooled_chunks(&self, class: ChunkClass) -> usize {
        match class {
            ChunkClass::Tiny => self.tiny.len(),
            ChunkClass::Init => self.init.len(),
            ChunkClass::Medium => self.medium.len(),
            ChunkClass::Large => self.large.len(),
        }
    }

    /// Free every pooled chunk; used at shutdown
    pub fn clear(&self) -> usize {
        let freed = self.tiny.clear() + self.init.clear() + self.medium.clear() + self.large.clear();
        debug!(target: "vmcore::pool", freed, "chunk pools cleared");
        freed
    }
}

impl Default for ChunkPools {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkPools {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::size_class::{INIT_SIZE, LARGE_SIZE, NON_POOL_SIZE, TINY_SIZE};

    #[test]
    fn push_then_pop_returns_same_chunk() {
        let pool: ChunkPool<Tiny> = ChunkPool::new();
        let chunk = ClassChunk::<Tiny>::allocate();
        let id = chunk.as_chunk().id();

        pool.push(chunk);
        let popped = pool.pop().expect("pooled chunk");
        assert_eq!(popped.as_chunk().id(), id);
        assert_eq!(popped.as_chunk().len(), TINY_SIZE);
        assert!(pool.pop().is_none());
    }

    #[test]
    fn pool_is_lifo() {
        let pool: ChunkPool<Init> = ChunkPool::new();
        let first = ClassChunk::<Init>::allocate();
        let second = ClassChunk::<Init>::allocate();
        let (first_id, second_id) = (first.as_chunk().id(), second.as_chunk().id());

        pool.push(first);
        pool.push(second);
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.pop().map(|c| c.as_chunk().id()), Some(second_id));
        assert_eq!(pool.pop().map(|c| c.as_chunk().id()), Some(first_id));
        assert!(pool.is_empty());
    }

    #[test]
    fn popped_chunk_is_detached() {
        let pool: ChunkPool<Tiny> = ChunkPool::new();
        pool.push(ClassChunk::allocate());
        pool.push(ClassChunk::allocate());

        let popped = pool.pop().expect("chunk");
        assert!(popped.as_chunk().next().is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn mismatched_chunk_is_rejected() {
        let chunk = Chunk::new(TINY_SIZE + 8);
        let rejected = ClassChunk::<Tiny>::try_from_chunk(chunk).expect_err("wrong class");
        assert_eq!(rejected.len(), TINY_SIZE + 8);
    }

    #[test]
    fn chained_chunk_is_rejected() {
        let pool: ChunkPool<Tiny> = ChunkPool::new();
        let mut head = Chunk::new(TINY_SIZE);
        head.replace_next(Some(Chunk::new(TINY_SIZE)));

        let mut rejected = ClassChunk::<Tiny>::try_from_chunk(head).expect_err("still chained");
        assert!(rejected.next().is_some());
        assert!(pool.is_empty());

        let tail = rejected.take_next().expect("tail");
        pool.push(ClassChunk::try_from_chunk(rejected).expect("detached head"));
        pool.push(ClassChunk::try_from_chunk(tail).expect("detached tail"));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn clear_frees_everything() {
        let pool: ChunkPool<Medium> = ChunkPool::new();
        for _ in 0..3 {
            pool.push(ClassChunk::allocate());
        }
        assert_eq!(pool.clear(), 3);
        assert!(pool.is_empty());
    }

    #[test]
    fn release_routes_by_exact_length() {
        let pools = ChunkPools::with_zap(false);

        pools.release(Chunk::new(TINY_SIZE));
        pools.release(Chunk::new(LARGE_SIZE));
        pools.release(Chunk::new(NON_POOL_SIZE));

        assert_eq!(pools.pooled_chunks(ChunkClass::Tiny), 1);
        assert_eq!(pools.pooled_chunks(ChunkClass::Init), 0);
        assert_eq!(pools.pooled_chunks(ChunkClass::Medium), 0);
        assert_eq!(pools.pooled_chunks(ChunkClass::Large), 1);
    }

    #[test]
    fn acquire_prefers_pooled_chunk() {
        let pools = ChunkPools::with_zap(false);
        let chunk = Chunk::new(INIT_SIZE);
        let (id, data) = (chunk.id(), chunk.data());
        pools.release(chunk);

        let reused = pools.acquire(INIT_SIZE);
        assert_eq!(reused.data(), data);
        assert_ne!(reused.id(), id, "recycled chunk keeps its old id");
        assert_eq!(pools.pooled_chunks(ChunkClass::Init), 0);
    }

    #[test]
    fn acquire_never_pools_non_class_sizes() {
        let pools = ChunkPools::with_zap(false);
        let chunk = pools.acquire(NON_POOL_SIZE);
        assert_eq!(chunk.len(), NON_POOL_SIZE);
        pools.release(chunk);
        assert!(ChunkClass::ALL.iter().all(|&c| pools.pooled_chunks(c) == 0));
    }

    #[test]
    fn release_chain_splits_by_each_node_length() {
        let pools = ChunkPools::with_zap(false);

        let mut head = Chunk::new(TINY_SIZE);
        let mut middle = Chunk::new(NON_POOL_SIZE);
        middle.replace_next(Some(Chunk::new(INIT_SIZE)));
        head.replace_next(Some(middle));

        pools.release_chain(head);

        assert_eq!(pools.pooled_chunks(ChunkClass::Tiny), 1);
        assert_eq!(pools.pooled_chunks(ChunkClass::Init), 1);
    }

    #[test]
    fn zapping_pools_fill_released_chunks() {
        let pools = ChunkPools::with_zap(true);
        let chunk = Chunk::new(TINY_SIZE);
        unsafe { core::ptr::write_bytes(chunk.data().as_ptr(), 0, TINY_SIZE) };
        pools.release(chunk);

        let recycled = pools.acquire(TINY_SIZE);
        let bytes = unsafe { core::slice::from_raw_parts(recycled.data().as_ptr(), TINY_SIZE) };
        assert!(bytes.iter().all(|&b| b == crate::memory::chunk::BAD_CHUNK_BYTE));
    }
}
