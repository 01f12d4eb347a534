//! Owned kernel file descriptors

use crate::error::{Result, SysError};
use crate::native::Syscalls;

use nix::fcntl::OFlag;
use std::fmt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

const CLOSED: RawFd = -1;

/// A native handle released exactly once, on [`close`](Self::close) or drop
pub struct FileDescriptor {
    fd: AtomicI32,
    sys: Arc<dyn Syscalls>,
}

impl FileDescriptor {
    /// Open `path` with the given flags
    pub fn open(sys: Arc<dyn Syscalls>, path: impl AsRef<Path>, flags: OFlag) -> Result<Self> {
        let path = path.as_ref();
        let fd = sys.open(path, flags)?;
        log::trace!("fd: opened {} as {}", path.display(), fd);
        Ok(Self::from_raw(sys, fd))
    }

    /// Take ownership of a descriptor handed out by the kernel
    pub fn from_raw(sys: Arc<dyn Syscalls>, fd: RawFd) -> Self {
        Self {
            fd: AtomicI32::new(fd),
            sys,
        }
    }

    /// The raw handle, or [`SysError::InvalidDescriptor`] once closed
    pub fn raw(&self) -> Result<RawFd> {
        match self.fd.load(Ordering::Acquire) {
            CLOSED => Err(SysError::InvalidDescriptor),
            fd => Ok(fd),
        }
    }

    pub fn is_open(&self) -> bool {
        self.fd.load(Ordering::Acquire) != CLOSED
    }

    pub fn syscalls(&self) -> &Arc<dyn Syscalls> {
        &self.sys
    }

    /// Read at most `buf.len()` bytes; a short count is not an error
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.sys.read(self.raw()?, buf)
    }

    /// Write at most `buf.len()` bytes; a short count is not an error
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.sys.write(self.raw()?, buf)
    }

    /// Issue an ioctl on this descriptor
    ///
    /// # Safety
    ///
    /// Same contract as [`Syscalls::ioctl`].
    pub unsafe fn ioctl(&self, request: u32, arg: *mut std::ffi::c_void) -> Result<libc::c_int> {
        let fd = self.raw()?;
        // SAFETY: forwarded from the caller
        unsafe { self.sys.ioctl(fd, request, arg) }
    }

    /// Release the handle
    ///
    /// Only the first call reaches the kernel; later calls are no-ops, so a
    /// number recycled by the kernel for another file is never closed twice.
    pub fn close(&self) -> Result<()> {
        match self.fd.swap(CLOSED, Ordering::AcqRel) {
            CLOSED => Ok(()),
            fd => {
                log::trace!("fd: closing {}", fd);
                self.sys.close(fd)
            }
        }
    }
}

impl Drop for FileDescriptor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("fd: close on drop failed: {}", e);
        }
    }
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileDescriptor")
            .field(&self.fd.load(Ordering::Relaxed))
            .finish()
    }
}
