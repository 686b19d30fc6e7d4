//! Memory substrate - chunk-pooled arenas over reserved virtual spaces
//!
//! Design: two independent stacks:
//! 1. `Arena` bump allocation (fast path) growing by `Chunk`s that are
//!    recycled through per-size-class `ChunkPool`s
//! 2. `VirtSpace` address-space bookkeeping: reserve once, then commit and
//!    uncommit a prefix on demand, with `Bumper` carving blocks out of the
//!    committed prefix
//!
//! Arenas never touch virtual spaces; higher layers (class metadata, object
//! allocation) pick whichever fits.

pub mod align;
pub mod size_class;
mod chunk;
mod chunk_pool;
mod arena;
mod mem_region;
mod bumper;
mod virt_space;
mod error;


pub use arena::{Arena, ArenaMark, ArenaStats};
pub use bumper::Bumper;
pub use chunk::{ChainIter, Chunk, ChunkId, BAD_CHUNK_BYTE};
pub use chunk_pool::{ChunkPool, ChunkPools, ClassChunk};
pub use error::{Result, VirtSpaceError};
pub use mem_region::MemRegion;
pub use size_class::{
    ChunkClass, SizeClass, INIT_SIZE, LARGE_SIZE, MEDIUM_SIZE, NON_POOL_SIZE, SLACK, TINY_SIZE,
};
pub use virt_space::VirtSpace;

use crate::config::PoolConfig;
use crate::logging::debug;

/// Initialize the memory subsystem
///
/// Creates the process-wide pools so the first arena does not pay for it.
/// Pools that already exist keep their original policy.
pub fn init(config: &PoolConfig) {
    let pools = ChunkPools::init_global(config.zap);
    for class in ChunkClass::ALL {
        debug!(target: "vmcore::pool", class = class.name(), size = class.size(), "chunk size class");
    }
    debug!(
        target: "vmcore::pool",
        zap = pools.zaps(),
        page_size = crate::os::page_size(),
        "memory subsystem initialized"
    );
}

/// Free every chunk held by the process-wide pools
///
/// Returns the number of chunks freed. Arenas created afterwards still work;
/// they simply start from empty pools.
pub fn cleanup() -> usize {
    ChunkPools::global().clear()
}
