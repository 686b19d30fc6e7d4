//! vmcore - memory substrate for a managed runtime
//!
//! This crate provides the allocation layer that object allocation and the
//! class-metadata space are built on:
//! - `memory::Arena`: chunk-backed bump allocation with mark/restore
//! - `memory::ChunkPools`: per-size-class chunk recycling across arenas
//! - `memory::VirtSpace`: reserved address space with a committed prefix
//!
//! Call `init` (or `init_with_config`) once at startup and `cleanup` at
//! shutdown; arenas and virtual spaces can be used without either.

pub mod config;
pub mod logging;
pub mod memory;
pub mod os;

pub use config::{ConfigError, VmConfig};
pub use memory::{Arena, ArenaMark, ChunkPools, VirtSpace, VirtSpaceError};

/// Initialize logging and the memory subsystem from the environment
pub fn init() {
    init_with_config(&VmConfig::from_env());
}

/// Initialize logging and the memory subsystem
pub fn init_with_config(config: &VmConfig) {
    logging::init_with_config(config.log_config());
    memory::init(&config.pools);
    logging::log_runtime_init();
}

/// Drain the process-wide chunk pools
pub fn cleanup() {
    let freed = memory::cleanup();
    logging::log_runtime_shutdown(freed);
}

/// Runtime initialization
#[no_mangle]
pub extern "C" fn vmcore_runtime_init() {
    init();
}

/// Runtime cleanup
#[no_mangle]
pub extern "C" fn vmcore_runtime_cleanup() {
    cleanup();
}
