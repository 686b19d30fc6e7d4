use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use winapi::ctypes::c_void;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::GetSystemInfo;
use winapi::um::winnt::{
    MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS,
    PAGE_READWRITE,
};

pub fn page_size() -> usize {
    let mut info = MaybeUninit::uninit();
    unsafe {
        GetSystemInfo(info.as_mut_ptr());
        info.assume_init().dwPageSize as usize
    }
}

pub unsafe fn reserve(hint: *mut u8, size: usize) -> Option<NonNull<u8>> {
    let mut addr = VirtualAlloc(hint as *mut c_void, size, MEM_RESERVE, PAGE_NOACCESS);
    if addr.is_null() && !hint.is_null() {
        // The hint is only a preference
        addr = VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE, PAGE_NOACCESS);
    }
    NonNull::new(addr as *mut u8)
}

pub unsafe fn commit(addr: *mut u8, size: usize, executable: bool) -> bool {
    let protect = if executable { PAGE_EXECUTE_READWRITE } else { PAGE_READWRITE };
    !VirtualAlloc(addr as *mut c_void, size, MEM_COMMIT, protect).is_null()
}

pub unsafe fn uncommit(addr: *mut u8, size: usize) -> bool {
    VirtualFree(addr as *mut c_void, size, MEM_DECOMMIT) != 0
}

pub unsafe fn release(addr: *mut u8, _size: usize) -> bool {
    VirtualFree(addr as *mut c_void, 0, MEM_RELEASE) != 0
}
