//! Blocking readiness waits on a single descriptor

use crate::error::{Result, SysError};
use crate::fd::FileDescriptor;
use crate::kernel_struct;
use crate::marshal::{native_identity, StructKind};

use nix::poll::PollFlags;
use std::time::Duration;

kernel_struct! {
    /// `struct pollfd`
    pub struct PollFd as "pollfd" {
        pub fd: i32,
        pub events: i16,
        pub revents: i16,
    }
}

native_identity!(PollFd, StructKind::PollFd);

impl PollFd {
    pub fn new(fd: i32, events: PollFlags) -> Self {
        Self {
            fd,
            events: events.bits(),
            revents: 0,
        }
    }

    /// Events reported by the kernel
    pub fn returned(&self) -> PollFlags {
        PollFlags::from_bits_truncate(self.revents)
    }
}

/// Conditions the kernel reports whether or not they were requested
const FAULT_EVENTS: PollFlags = PollFlags::POLLERR
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLNVAL);

/// Wait until `fd` is readable or `timeout` elapses
///
/// Returns `Ok(false)` on timeout. An interrupted wait surfaces as an error
/// for which [`crate::SysError::is_interrupted`] is true. Error, hangup and
/// invalid-descriptor conditions without pending data fail with
/// [`SysError::PollCondition`], since every later poll would report them again.
pub fn wait_readable(fd: &FileDescriptor, timeout: Duration) -> Result<bool> {
    let raw = fd.raw()?;
    let mut fds = [PollFd::new(raw, PollFlags::POLLIN)];
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let ready = fd.syscalls().poll(&mut fds, timeout_ms)?;
    if ready == 0 {
        return Ok(false);
    }
    let revents = fds[0].returned();
    if revents.contains(PollFlags::POLLIN) {
        return Ok(true);
    }
    if revents.intersects(FAULT_EVENTS) {
        return Err(SysError::PollCondition { fd: raw, revents });
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{deserialize, serialize};
    use crate::testing::FakeKernel;

    #[test]
    fn test_pollfd_layout() {
        assert_eq!(PollFd::LAYOUT.size, 8);
        assert_eq!(PollFd::LAYOUT.field("events").unwrap().offset, 4);
        assert_eq!(PollFd::LAYOUT.field("revents").unwrap().offset, 6);
    }

    #[test]
    fn test_pollfd_flags() {
        let mut pfd = PollFd::new(5, PollFlags::POLLIN | PollFlags::POLLPRI);
        assert_eq!(pfd.events, libc::POLLIN | libc::POLLPRI);
        pfd.revents = libc::POLLIN | libc::POLLHUP;
        assert!(pfd.returned().contains(PollFlags::POLLIN));
        assert!(pfd.returned().contains(PollFlags::POLLHUP));

        let back: PollFd = deserialize(&serialize(&pfd)).unwrap();
        assert_eq!(back, pfd);
    }

    #[test]
    fn test_wait_readable_hangup() {
        let kernel = FakeKernel::new();
        let raw = kernel.reserve_fd();
        let fd = FileDescriptor::from_raw(kernel.clone(), raw);
        assert!(!wait_readable(&fd, Duration::from_millis(1)).unwrap());

        kernel.raise_poll_condition(raw, PollFlags::POLLHUP | PollFlags::POLLERR);
        let err = wait_readable(&fd, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(
            err,
            SysError::PollCondition { revents, .. } if revents.contains(PollFlags::POLLHUP)
        ));
        assert_eq!(err.kind(), sbcio_core::ErrorKind::IllegalState);

        // queued data is still delivered before the condition
        kernel.push_readable(raw, vec![1]);
        assert!(wait_readable(&fd, Duration::from_millis(1)).unwrap());
    }
}
