//! Chunk size classes
//!
//! Four canonical capacities are pooled. Each one is a round allocation unit
//! minus `SLACK`, the per-chunk bookkeeping overhead, so header plus data
//! lands on a tidy boundary. Every other length bypasses pooling.

use super::align::K;

/// Per-chunk header and malloc overhead
#[cfg(target_pointer_width = "64")]
pub const SLACK: usize = 40;
#[cfg(not(target_pointer_width = "64"))]
pub const SLACK: usize = 24;

pub const TINY_SIZE: usize = 256 - SLACK;
pub const INIT_SIZE: usize = K - SLACK;
pub const MEDIUM_SIZE: usize = 10 * K - SLACK;
pub const LARGE_SIZE: usize = 32 * K - SLACK;

/// A length guaranteed not to match any pool, for callers that want a
/// short-lived chunk returned straight to the heap
pub const NON_POOL_SIZE: usize = INIT_SIZE + 32;

/// Runtime handle for a pooled size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkClass {
    Tiny,
    Init,
    Medium,
    Large,
}

impl ChunkClass {
    /// All classes in ascending size order
    pub const ALL: [ChunkClass; 4] = [
        ChunkClass::Tiny,
        ChunkClass::Init,
        ChunkClass::Medium,
        ChunkClass::Large,
    ];

    #[inline]
    pub const fn size(self) -> usize {
        match self {
            ChunkClass::Tiny => TINY_SIZE,
            ChunkClass::Init => INIT_SIZE,
            ChunkClass::Medium => MEDIUM_SIZE,
            ChunkClass::Large => LARGE_SIZE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ChunkClass::Tiny => "tiny",
            ChunkClass::Init => "init",
            ChunkClass::Medium => "medium",
            ChunkClass::Large => "large",
        }
    }

    /// Class whose size is exactly `len`, if any
    #[inline]
    pub fn for_exact(len: usize) -> Option<ChunkClass> {
        Self::ALL.into_iter().find(|class| class.size() == len)
    }

    /// Smallest class able to hold `size` bytes; `None` when oversized
    #[inline]
    pub fn for_request(size: usize) -> Option<ChunkClass> {
        Self::ALL.into_iter().find(|class| class.size() >= size)
    }
}

impl core::fmt::Display for ChunkClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.name(), self.size())
    }
}

/// Compile-time size class, used to parameterize pools so that a chunk of
/// the wrong length cannot be pushed
pub trait SizeClass: Send + Sync + 'static {
    const CLASS: ChunkClass;
    const SIZE: usize = Self::CLASS.size();
}

macro_rules! size_classes {
    ($($(#[$doc:meta])* $marker:ident => $class:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct $marker;

            impl SizeClass for $marker {
                const CLASS: ChunkClass = ChunkClass::$class;
            }
        )*
    };
}

size_classes! {
    /// 256 - slack
    Tiny => Tiny,
    /// 1K - slack, the default arena size
    Init => Init,
    /// 10K - slack
    Medium => Medium,
    /// 32K - slack, the largest pooled chunk
    Large => Large,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_are_ascending_and_word_aligned() {
        let sizes: Vec<usize> = ChunkClass::ALL.iter().map(|c| c.size()).collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        for size in sizes {
            assert_eq!(size % core::mem::size_of::<usize>(), 0);
        }
    }

    #[test]
    fn exact_lookup() {
        assert_eq!(ChunkClass::for_exact(TINY_SIZE), Some(ChunkClass::Tiny));
        assert_eq!(ChunkClass::for_exact(LARGE_SIZE), Some(ChunkClass::Large));
        assert_eq!(ChunkClass::for_exact(TINY_SIZE + 8), None);
        assert_eq!(ChunkClass::for_exact(NON_POOL_SIZE), None);
    }

    #[test]
    fn request_picks_smallest_fit() {
        assert_eq!(ChunkClass::for_request(1), Some(ChunkClass::Tiny));
        assert_eq!(ChunkClass::for_request(TINY_SIZE), Some(ChunkClass::Tiny));
        assert_eq!(ChunkClass::for_request(TINY_SIZE + 1), Some(ChunkClass::Init));
        assert_eq!(ChunkClass::for_request(INIT_SIZE + 1), Some(ChunkClass::Medium));
        assert_eq!(ChunkClass::for_request(LARGE_SIZE), Some(ChunkClass::Large));
        assert_eq!(ChunkClass::for_request(LARGE_SIZE + 1), None);
    }

    #[test]
    fn markers_match_runtime_classes() {
        assert_eq!(Tiny::SIZE, TINY_SIZE);
        assert_eq!(Init::SIZE, INIT_SIZE);
        assert_eq!(Medium::SIZE, MEDIUM_SIZE);
        assert_eq!(Large::SIZE, LARGE_SIZE);
    }
}
