//! Half-open address ranges

use core::fmt;

/// `[start, end)` in the process address space
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemRegion {
    start: usize,
    end: usize,
}

impl MemRegion {
    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn with_size(start: usize, size: usize) -> Self {
        Self::with_end(start, start + size)
    }

    pub fn with_end(start: usize, end: usize) -> Self {
        assert!(end >= start, "bad memory region {:#x}..{:#x}", start, end);
        Self { start, end }
    }

    #[inline]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub const fn contains(&self, addr: usize) -> bool {
        self.start <= addr && addr < self.end
    }

    /// True if `other` lies entirely within this region
    pub const fn covers(&self, other: &MemRegion) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Debug for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemRegion({:#x}..{:#x}, {} bytes)", self.start, self.end, self.size())
    }
}
