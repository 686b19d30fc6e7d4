//! Bumpers - bump allocation over a committed address range
//!
//! Design: a single `top` cursor moving from the region's start toward its
//! end. `alloc` is the exclusive path; `par_alloc` claims space with a CAS
//! loop so many threads can carve blocks out of one region. Nothing is ever
//! freed individually; `clear` rewinds the whole region.
//!
//! Typical use sits on a `VirtSpace`: build the bumper over
//! `committed_region()`, and after `VirtSpace::expand_by` succeeds extend it
//! with the same byte count.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::mem_region::MemRegion;
use super::virt_space::VirtSpace;
use crate::logging::trace;

pub struct Bumper {
    region: MemRegion,
    top: AtomicUsize,
}

impl Bumper {
    pub fn new(region: MemRegion) -> Self {
        Self {
            top: AtomicUsize::new(region.start()),
            region,
        }
    }

    /// Bumper over everything `space` has committed so far
    pub fn over_committed(space: &VirtSpace) -> Self {
        Self::new(space.committed_region())
    }

    #[inline]
    pub fn region(&self) -> MemRegion {
        self.region
    }

    #[inline]
    pub fn top(&self) -> usize {
        self.top.load(Ordering::Acquire)
    }

    /// Bytes handed out since the last `clear`
    #[inline]
    pub fn allocated(&self) -> usize {
        self.top() - self.region.start()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.region.end() - self.top()
    }

    /// True if `addr` lies in memory already handed out
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.region.start() && addr < self.top()
    }

    /// Rewind to the start of the region
    pub fn clear(&mut self) {
        *self.top.get_mut() = self.region.start();
    }

    /// Claim `size` bytes, or `None` if the region cannot hold them
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let top = self.top.get_mut();
        let new_top = top.checked_add(size).filter(|&end| end <= self.region.end())?;

        let block = *top;
        *top = new_top;
        NonNull::new(block as *mut u8)
    }

    /// Claim `size` bytes from a bumper shared between threads
    pub fn par_alloc(&self, size: usize) -> Option<NonNull<u8>> {
        let mut top = self.top.load(Ordering::Relaxed);
        loop {
            let new_top = top.checked_add(size).filter(|&end| end <= self.region.end())?;

            match self.top.compare_exchange_weak(top, new_top, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return NonNull::new(top as *mut u8),
                Err(current) => top = current,
            }
        }
    }

    /// Extend the region's end by `size` bytes
    ///
    /// The caller must have made `[end, end + size)` usable, normally by
    /// growing the `VirtSpace` this bumper sits on.
    pub fn expand_by(&mut self, size: usize) {
        let end = self
            .region
            .end()
            .checked_add(size)
            .unwrap_or_else(|| panic!("bumper region of {} bytes cannot grow by {}", self.region.size(), size));

        self.region = MemRegion::with_end(self.region.start(), end);
        trace!(target: "vmcore::virt_space", size, capacity = self.region.size(), "bumper expanded");
    }
}

impl fmt::Debug for Bumper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bumper")
            .field("region", &self.region)
            .field("allocated", &self.allocated())
            .finish()
    }
}
