//! Process-level init and cleanup

use vmcore::config::VmConfig;
use vmcore::memory::{ChunkClass, INIT_SIZE};
use vmcore::{Arena, ChunkPools};

#[test]
fn init_arena_cleanup_cycle() {
    let config = VmConfig::from_toml_str("[pools]\nzap = false\n[logging]\nlevel = \"warn\"\n")
        .expect("config");
    vmcore::init_with_config(&config);
    assert!(vmcore::logging::is_initialized());
    assert!(!ChunkPools::global().zaps());

    let mut arena = Arena::new(INIT_SIZE);
    arena.alloc(64);
    drop(arena);
    assert_eq!(ChunkPools::global().pooled_chunks(ChunkClass::Init), 1);

    vmcore::cleanup();
    assert_eq!(ChunkPools::global().pooled_chunks(ChunkClass::Init), 0);

    // Arenas keep working against drained pools
    let mut arena = Arena::default();
    arena.alloc(8);
    drop(arena);

    // Repeated init through the C entry points keeps the first policy
    vmcore::vmcore_runtime_init();
    assert!(!ChunkPools::global().zaps());
    vmcore::vmcore_runtime_cleanup();
}
