//! OS memory primitives - page size, reserve, commit, uncommit, release
//!
//! Design: thin platform layer with one backend per OS family:
//! - Unix: `mmap(PROT_NONE)` reservations, `mprotect` to commit,
//!   `madvise(MADV_DONTNEED)` + `mprotect(PROT_NONE)` to uncommit
//! - Windows: `VirtualAlloc(MEM_RESERVE)`, `MEM_COMMIT` / `MEM_DECOMMIT`,
//!   `VirtualFree(MEM_RELEASE)`
//!
//! Every call reports success or failure; retry policy belongs to callers.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

use crate::logging::{log_os_failure, perf};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

static PAGE_SIZE: Lazy<usize> = Lazy::new(platform::page_size);

/// VM page size, queried once
#[inline]
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// Reserve `size` bytes of address space with no access rights
///
/// `hint` is advisory; the OS may place the reservation elsewhere.
pub fn reserve_memory(hint: Option<usize>, size: usize) -> Option<NonNull<u8>> {
    let hint = hint.unwrap_or(0) as *mut u8;
    let reserved = unsafe { platform::reserve(hint, size) };
    if reserved.is_none() {
        log_os_failure("reserve", hint as usize, size);
    }
    reserved
}

/// Make `[addr, addr + size)` readable and writable, and executable if asked
///
/// # Safety
/// The range must lie inside a live reservation made by `reserve_memory`.
pub unsafe fn commit_memory(addr: NonNull<u8>, size: usize, executable: bool) -> bool {
    let ok = platform::commit(addr.as_ptr(), size, executable);
    if !ok {
        log_os_failure("commit", addr.as_ptr() as usize, size);
    }
    ok
}

/// Return the pages in `[addr, addr + size)` to the OS, keeping the range reserved
///
/// # Safety
/// The range must lie inside a live reservation, and nothing may still
/// reference memory inside it.
pub unsafe fn uncommit_memory(addr: NonNull<u8>, size: usize) -> bool {
    let ok = platform::uncommit(addr.as_ptr(), size);
    if !ok {
        log_os_failure("uncommit", addr.as_ptr() as usize, size);
    }
    ok
}

/// Release a whole reservation
///
/// # Safety
/// `addr` and `size` must describe exactly one reservation from `reserve_memory`.
pub unsafe fn release_memory(addr: NonNull<u8>, size: usize) -> bool {
    let ok = platform::release(addr.as_ptr(), size);
    if !ok {
        log_os_failure("release", addr.as_ptr() as usize, size);
    }
    ok
}

/// Touch one word in every page of `[addr, addr + size)` so the OS backs it now
///
/// # Safety
/// The range must be committed and word-aligned at `addr`.
pub unsafe fn pretouch_memory(addr: NonNull<u8>, size: usize) {
    let _perf = perf::track("pretouch");

    let page = page_size();
    let mut offset = 0;
    while offset < size {
        let word = &*(addr.as_ptr().add(offset) as *const AtomicUsize);
        word.fetch_add(0, Ordering::Relaxed);
        offset += page;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let page = page_size();
        assert!(page >= 4096);
        assert!(page.is_power_of_two());
    }

    #[test]
    fn reserve_commit_touch_release() {
        let page = page_size();
        let size = 4 * page;
        let base = reserve_memory(None, size).expect("reserve");

        unsafe {
            assert!(commit_memory(base, 2 * page, false));
            pretouch_memory(base, 2 * page);
            core::ptr::write_bytes(base.as_ptr(), 0x11, 2 * page);
            assert_eq!(*base.as_ptr().add(page), 0x11);

            assert!(uncommit_memory(base, 2 * page));
            assert!(release_memory(base, size));
        }
    }

    #[test]
    #[cfg(any(target_os = "linux", windows))]
    fn recommitted_pages_read_zero() {
        let page = page_size();
        let base = reserve_memory(None, page).expect("reserve");

        unsafe {
            assert!(commit_memory(base, page, false));
            *base.as_ptr() = 0x42;
            assert!(uncommit_memory(base, page));
            assert!(commit_memory(base, page, false));
            assert_eq!(*base.as_ptr(), 0);
            assert!(release_memory(base, page));
        }
    }
}
