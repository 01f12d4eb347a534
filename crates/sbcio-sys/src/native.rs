//! Native call abstraction and the syscall seam
//!
//! All kernel entry points go through [`Syscalls`]. The production
//! implementation, [`Libc`], invokes the C library; tests substitute an
//! in-memory kernel.
//!
//! Calls come in two flavours. A captured-state call reads errno right after
//! a negative return and turns it into [`SysError::CapturedState`]; these are
//! the calls that can fail for ordinary reasons (`open`, `close`, `read`,
//! `write`, `ioctl`). A plain call wraps the failure in
//! [`SysError::NativeCall`] and is used where failure is unexpected (`poll`).

use crate::error::{Result, SysError};
use crate::poll::PollFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use std::ffi::{c_void, CString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::Arc;

/// Return values that signal failure by being negative
pub trait NativeReturn: Copy {
    fn is_failure(self) -> bool;
}

impl NativeReturn for i32 {
    fn is_failure(self) -> bool {
        self < 0
    }
}

impl NativeReturn for isize {
    fn is_failure(self) -> bool {
        self < 0
    }
}

/// A named native symbol and how its failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCall {
    symbol: &'static str,
    captured: bool,
}

impl NativeCall {
    /// Failure is wrapped in [`SysError::NativeCall`]
    pub const fn plain(symbol: &'static str) -> Self {
        Self {
            symbol,
            captured: false,
        }
    }

    /// Failure errno is captured into [`SysError::CapturedState`]
    pub const fn captured(symbol: &'static str) -> Self {
        Self {
            symbol,
            captured: true,
        }
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    /// Run the call and classify a negative return
    pub fn invoke<R: NativeReturn>(&self, call: impl FnOnce() -> R) -> Result<R> {
        let ret = call();
        if !ret.is_failure() {
            return Ok(ret);
        }
        let errno = Errno::last();
        Err(self.fail(errno))
    }

    /// Build the error this call reports for `errno`
    pub fn fail(&self, errno: Errno) -> SysError {
        if self.captured {
            SysError::captured(self.symbol, errno)
        } else {
            SysError::NativeCall {
                symbol: self.symbol,
                source: std::io::Error::from_raw_os_error(errno as i32),
            }
        }
    }
}

pub const OPEN: NativeCall = NativeCall::captured("open");
pub const CLOSE: NativeCall = NativeCall::captured("close");
pub const READ: NativeCall = NativeCall::captured("read");
pub const WRITE: NativeCall = NativeCall::captured("write");
pub const IOCTL: NativeCall = NativeCall::captured("ioctl");
pub const POLL: NativeCall = NativeCall::plain("poll");

/// Kernel entry points used by the device layer
pub trait Syscalls: Send + Sync {
    fn open(&self, path: &Path, flags: OFlag) -> Result<RawFd>;

    fn close(&self, fd: RawFd) -> Result<()>;

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, fd: RawFd, buf: &[u8]) -> Result<usize>;

    /// Issue an ioctl with an untyped argument pointer
    ///
    /// # Safety
    ///
    /// `arg` must point to memory laid out as `request` expects, valid for
    /// reads and writes of that many bytes, and any pointers embedded in it
    /// must be valid for the transfer lengths they are paired with.
    unsafe fn ioctl(&self, fd: RawFd, request: u32, arg: *mut c_void) -> Result<libc::c_int>;

    /// Wait for readiness, returning the number of descriptors with events
    fn poll(&self, fds: &mut [PollFd], timeout_ms: i32) -> Result<usize>;

    fn exists(&self, path: &Path) -> bool;
}

/// Syscalls backed by the C library
#[derive(Debug, Default, Clone, Copy)]
pub struct Libc;

const _: () = assert!(std::mem::size_of::<PollFd>() == std::mem::size_of::<libc::pollfd>());

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| SysError::InvalidPath(path.display().to_string()))
}

impl Syscalls for Libc {
    fn open(&self, path: &Path, flags: OFlag) -> Result<RawFd> {
        let path = c_path(path)?;
        // SAFETY: `path` is NUL-terminated and outlives the call
        OPEN.invoke(|| unsafe { libc::open(path.as_ptr(), flags.bits()) })
    }

    fn close(&self, fd: RawFd) -> Result<()> {
        // SAFETY: closing an integer handle has no memory-safety requirements
        CLOSE.invoke(|| unsafe { libc::close(fd) }).map(|_| ())
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        // SAFETY: the kernel writes at most `buf.len()` bytes into `buf`
        let n = READ.invoke(|| unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })?;
        Ok(n as usize)
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        // SAFETY: the kernel reads at most `buf.len()` bytes from `buf`
        let n = WRITE.invoke(|| unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })?;
        Ok(n as usize)
    }

    unsafe fn ioctl(&self, fd: RawFd, request: u32, arg: *mut c_void) -> Result<libc::c_int> {
        // SAFETY: upheld by the caller per the trait contract
        IOCTL.invoke(|| unsafe { libc::ioctl(fd, request as _, arg) })
    }

    fn poll(&self, fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
        // SAFETY: PollFd has the layout of `struct pollfd` (checked above) and
        // the kernel touches only `fds.len()` entries
        let n = POLL.invoke(|| unsafe {
            libc::poll(
                fds.as_mut_ptr().cast::<libc::pollfd>(),
                fds.len() as libc::nfds_t,
                timeout_ms,
            )
        })?;
        Ok(n as usize)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// The process-wide production syscall implementation
pub fn system() -> Arc<dyn Syscalls> {
    Arc::new(Libc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_call_reports_errno() {
        let err = OPEN.fail(Errno::EACCES);
        match err {
            SysError::CapturedState {
                symbol,
                errno,
                message,
            } => {
                assert_eq!(symbol, "open");
                assert_eq!(errno, libc::EACCES);
                assert_eq!(message, Errno::EACCES.desc());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_plain_call_wraps_io_error() {
        let err = POLL.fail(Errno::EINTR);
        assert!(matches!(err, SysError::NativeCall { symbol: "poll", .. }));
        assert!(err.is_interrupted());
    }

    #[test]
    fn test_invoke_passes_success_through() {
        assert_eq!(READ.invoke(|| 7 as libc::ssize_t).unwrap(), 7);
        assert_eq!(CLOSE.invoke(|| 0 as libc::c_int).unwrap(), 0);
    }

    #[test]
    fn test_libc_open_missing_path() {
        let err = Libc
            .open(Path::new("/nonexistent/sbcio/device"), OFlag::O_RDONLY)
            .unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOENT));
    }

    #[test]
    fn test_libc_rejects_interior_nul() {
        use std::ffi::OsStr;
        let path = Path::new(OsStr::from_bytes(b"/dev/bad\0path"));
        assert!(matches!(
            Libc.open(path, OFlag::O_RDONLY),
            Err(SysError::InvalidPath(_))
        ));
    }
}
