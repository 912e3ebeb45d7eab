use std::os::unix::io::RawFd;
use std::ptr::NonNull;

use errno::errno;
use libc::{
    c_int, c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_LOCKED, MAP_PRIVATE, MAP_SHARED,
    PROT_READ, PROT_WRITE,
};
use tracing::error;

use crate::error::{Error, Result};

/// A mapped memory area shared with the kernel. Unmapped on drop.
#[derive(Debug)]
pub struct MmapArea {
    ptr: NonNull<u8>,
    len: usize,
}
unsafe impl Send for MmapArea {}

impl MmapArea {
    /// Map the packet ring of `fd` into the process, shared and page-locked.
    pub fn map_socket(fd: RawFd, len: usize) -> Result<MmapArea> {
        MmapArea::map(fd, len, MAP_SHARED | MAP_LOCKED)
    }

    /// Private zeroed memory with the same alignment guarantees as a ring mapping.
    pub fn anonymous(len: usize) -> Result<MmapArea> {
        MmapArea::map(-1, len, MAP_PRIVATE | MAP_ANONYMOUS)
    }

    fn map(fd: RawFd, len: usize, flags: c_int) -> Result<MmapArea> {
        let ptr: *mut c_void;

        unsafe {
            ptr = mmap(
                std::ptr::null_mut(),
                len,
                PROT_READ | PROT_WRITE,
                flags,
                fd,
                0,
            );
        }

        if ptr == MAP_FAILED {
            return Err(Error::last_os("mmap"));
        }

        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok(MmapArea { ptr, len }),
            None => Err(Error::last_os("mmap")),
        }
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MmapArea {
    fn drop(&mut self) {
        let r: c_int;

        unsafe {
            r = munmap(self.ptr.as_ptr() as *mut c_void, self.len);
        }

        if r != 0 {
            error!(errno = errno().0, len = self.len, "munmap failed");
        }
    }
}
