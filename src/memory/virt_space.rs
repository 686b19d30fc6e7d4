//! Virtual spaces - a reserved address range with a committed prefix
//!
//! Design: reserve once, then grow and shrink the committed prefix
//! `[start, start + committed)` in place. No allocation policy lives here;
//! consumers such as the class-metadata space decide how much to commit
//! and what to do when the OS refuses.
//!
//! Invariants:
//! - `start` is aligned to `alignment` (itself a power of two, at least a page)
//! - `reserved` and `committed` are multiples of `alignment`
//! - `committed <= reserved`

use core::fmt;
use core::ptr::NonNull;

use super::align::{align_down, align_up, is_aligned};
use super::error::{Result, VirtSpaceError};
use super::mem_region::MemRegion;
use crate::config::VirtSpaceConfig;
use crate::logging::{log_commit, log_release, log_reserve, log_uncommit};
use crate::os;

pub struct VirtSpace {
    start: NonNull<u8>,
    reserved: usize,
    committed: usize,
    alignment: usize,
    executable: bool,
    always_pretouch: bool,
    /// What the OS actually handed out; wider than `[start, start + reserved)`
    /// when the first attempt was not aligned
    mapping: MemRegion,
}

// Safety: the reservation is owned exclusively by this value.
unsafe impl Send for VirtSpace {}

impl VirtSpace {
    /// Reserve `byte_size` bytes of address space, near `start_hint` if possible
    ///
    /// `alignment` is rounded up to a power of two no smaller than the OS
    /// page size (0 means page size), and `byte_size` is rounded up to it.
    /// An alignment with no representable power of two fails the reservation.
    pub fn new(
        start_hint: Option<usize>,
        byte_size: usize,
        alignment: usize,
        executable: bool,
    ) -> Result<Self> {
        let alignment = effective_alignment(alignment)
            .ok_or(VirtSpaceError::ReservationFailed { size: byte_size })?;
        let byte_size = checked_align_up(byte_size, alignment)
            .filter(|&size| size > 0)
            .ok_or(VirtSpaceError::ReservationFailed { size: byte_size })?;

        let (start, mapping) = reserve_aligned(start_hint, byte_size, alignment)?;

        log_reserve(start.as_ptr() as usize, byte_size, alignment, executable);

        Ok(Self {
            start,
            reserved: byte_size,
            committed: 0,
            alignment,
            executable,
            always_pretouch: false,
            mapping,
        })
    }

    /// Reserve using alignment, executable and pretouch policy from configuration
    pub fn with_config(
        start_hint: Option<usize>,
        byte_size: usize,
        config: &VirtSpaceConfig,
    ) -> Result<Self> {
        let mut space = Self::new(start_hint, byte_size, config.alignment, config.executable)?;
        space.always_pretouch = config.always_pretouch;
        Ok(space)
    }

    #[inline]
    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    /// One past the last reserved byte
    #[inline]
    pub fn end(&self) -> *mut u8 {
        self.start.as_ptr().wrapping_add(self.reserved)
    }

    /// Current commit top, one past the last committed byte
    #[inline]
    pub fn high(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(self.committed)) }
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    #[inline]
    pub fn committed(&self) -> usize {
        self.committed
    }

    #[inline]
    pub fn uncommitted(&self) -> usize {
        self.reserved - self.committed
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    #[inline]
    pub fn always_pretouch(&self) -> bool {
        self.always_pretouch
    }

    pub fn reserved_region(&self) -> MemRegion {
        MemRegion::with_size(self.start.as_ptr() as usize, self.reserved)
    }

    pub fn committed_region(&self) -> MemRegion {
        MemRegion::with_size(self.start.as_ptr() as usize, self.committed)
    }

    /// True iff `addr` lies within the reservation
    #[inline]
    pub fn contains<T>(&self, addr: *const T) -> bool {
        self.reserved_region().contains(addr as usize)
    }

    /// Commit the next `byte_size` bytes (rounded up to the alignment)
    ///
    /// On success the committed size grows whether or not `pretouch` was
    /// requested; pretouching only decides when the pages get backed.
    pub fn expand_by(&mut self, byte_size: usize, pretouch: bool) -> Result<()> {
        let available = self.uncommitted();
        let size = checked_align_up(byte_size, self.alignment)
            .filter(|&size| size <= available)
            .ok_or(VirtSpaceError::OutOfReservedSpace { requested: byte_size, available })?;
        if size == 0 {
            return Ok(());
        }

        let top = self.high();
        if !unsafe { os::commit_memory(top, size, self.executable) } {
            return Err(VirtSpaceError::CommitFailed { addr: top.as_ptr() as usize, size });
        }

        let pretouch = pretouch || self.always_pretouch;
        if pretouch {
            unsafe { os::pretouch_memory(top, size) };
        }

        self.committed += size;
        log_commit(top.as_ptr() as usize, size, self.committed, pretouch);
        Ok(())
    }

    /// Uncommit the trailing `byte_size` bytes (rounded down to the alignment)
    ///
    /// A request that rounds down to zero succeeds without touching the OS.
    /// A request larger than the committed size fails and changes nothing.
    pub fn shrink_by(&mut self, byte_size: usize) -> Result<()> {
        let size = align_down(byte_size, self.alignment);
        if size == 0 {
            return Ok(());
        }

        if byte_size > self.committed {
            return Err(VirtSpaceError::Underflow {
                requested: byte_size,
                committed: self.committed,
            });
        }

        let new_committed = self.committed - size;
        let new_top = unsafe { NonNull::new_unchecked(self.start.as_ptr().add(new_committed)) };
        if !unsafe { os::uncommit_memory(new_top, size) } {
            return Err(VirtSpaceError::UncommitFailed { addr: new_top.as_ptr() as usize, size });
        }

        self.committed = new_committed;
        log_uncommit(new_top.as_ptr() as usize, size, self.committed);
        Ok(())
    }
}

impl Drop for VirtSpace {
    fn drop(&mut self) {
        let base = self.mapping.start() as *mut u8;
        if let Some(base) = NonNull::new(base) {
            // Failure is already logged by the os layer; nothing else to do
            if unsafe { os::release_memory(base, self.mapping.size()) } {
                log_release(self.start.as_ptr() as usize, self.reserved);
            }
        }
    }
}

impl fmt::Debug for VirtSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtSpace")
            .field("reserved", &self.reserved_region())
            .field("committed", &self.committed)
            .field("alignment", &self.alignment)
            .field("executable", &self.executable)
            .finish()
    }
}

fn effective_alignment(requested: usize) -> Option<usize> {
    requested
        .max(1)
        .checked_next_power_of_two()
        .map(|align| align.max(os::page_size()))
}

fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    value.checked_add(align - 1).map(|v| align_down(v, align))
}

/// Reserve `size` bytes starting on an `alignment` boundary
///
/// Returns the aligned start and the full mapping to release later. If the
/// OS hands back an unaligned range, the request is retried with enough
/// slack to carve an aligned window out of it.
fn reserve_aligned(
    hint: Option<usize>,
    size: usize,
    alignment: usize,
) -> Result<(NonNull<u8>, MemRegion)> {
    let failed = VirtSpaceError::ReservationFailed { size };

    let base = os::reserve_memory(hint, size).ok_or_else(|| failed.clone())?;
    if is_aligned(base.as_ptr() as usize, alignment) {
        return Ok((base, MemRegion::with_size(base.as_ptr() as usize, size)));
    }

    unsafe { os::release_memory(base, size) };

    let padded = size.checked_add(alignment).ok_or_else(|| failed.clone())?;
    let base = os::reserve_memory(hint, padded).ok_or(failed)?;
    let aligned = align_up(base.as_ptr() as usize, alignment);
    let start = unsafe { NonNull::new_unchecked(aligned as *mut u8) };

    Ok((start, MemRegion::with_size(base.as_ptr() as usize, padded)))
}
