use core::ptr::NonNull;

use libc::{c_int, c_void};

#[cfg(any(target_os = "linux", target_os = "android"))]
const RESERVE_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RESERVE_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

pub unsafe fn reserve(hint: *mut u8, size: usize) -> Option<NonNull<u8>> {
    let addr = libc::mmap(hint as *mut c_void, size, libc::PROT_NONE, RESERVE_FLAGS, -1, 0);
    if addr == libc::MAP_FAILED {
        None
    } else {
        NonNull::new(addr as *mut u8)
    }
}

pub unsafe fn commit(addr: *mut u8, size: usize, executable: bool) -> bool {
    let mut prot = libc::PROT_READ | libc::PROT_WRITE;
    if executable {
        prot |= libc::PROT_EXEC;
    }
    libc::mprotect(addr as *mut c_void, size, prot) == 0
}

pub unsafe fn uncommit(addr: *mut u8, size: usize) -> bool {
    // Drop the backing pages first so a later commit sees zero-filled memory
    if libc::madvise(addr as *mut c_void, size, libc::MADV_DONTNEED) != 0 {
        return false;
    }
    libc::mprotect(addr as *mut c_void, size, libc::PROT_NONE) == 0
}

pub unsafe fn release(addr: *mut u8, size: usize) -> bool {
    libc::munmap(addr as *mut c_void, size) == 0
}

