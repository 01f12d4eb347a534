//! In-memory kernel for unit tests
//!
//! [`FakeKernel`] implements [`Syscalls`] over a small file tree, a table of
//! ioctl handlers keyed by request word, and per-descriptor queues of
//! readable data. Every call is logged so tests can assert on ordering.

use crate::error::Result;
use crate::ioctl::encoded_size;
use crate::native::{self, Syscalls};
use crate::poll::PollFd;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::PollFlags;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ffi::c_void;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type IoctlHandler = Box<dyn FnMut(RawFd, &mut [u8]) -> std::result::Result<i32, Errno> + Send>;
type WriteHook = Box<dyn FnMut(&mut FakeFs, &str) + Send>;

/// A logged kernel call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(PathBuf),
    Close(RawFd),
    Read(RawFd),
    Write(RawFd),
    Ioctl { fd: RawFd, request: u32 },
    Poll,
}

/// Files and directories visible to the fake kernel
#[derive(Debug, Default)]
pub struct FakeFs {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl FakeFs {
    /// Add a file, creating its parent directories
    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: &str) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files.insert(path, contents.to_string());
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Remove a directory and everything below it
    pub fn remove_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.dirs.retain(|d| !d.starts_with(path));
        self.files.retain(|f, _| !f.starts_with(path));
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }
}

struct OpenFile {
    path: Option<PathBuf>,
    pos: usize,
}

#[derive(Default)]
struct State {
    fs: FakeFs,
    next_fd: RawFd,
    open: HashMap<RawFd, OpenFile>,
    calls: Vec<Call>,
    writes: Vec<(PathBuf, String)>,
    device_writes: Vec<(RawFd, Vec<u8>)>,
    handlers: HashMap<u32, (usize, IoctlHandler)>,
    write_hooks: Vec<(PathBuf, WriteHook)>,
    readable: HashMap<RawFd, VecDeque<Vec<u8>>>,
    open_failures: HashMap<PathBuf, Errno>,
    close_failures: HashMap<PathBuf, Errno>,
    poll_failures: VecDeque<Errno>,
    conditions: HashMap<RawFd, PollFlags>,
}

/// Programmable stand-in for the kernel
pub struct FakeKernel {
    state: Mutex<State>,
    readable: Condvar,
}

impl FakeKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                next_fd: 3,
                ..Default::default()
            }),
            readable: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &str) {
        self.lock().fs.add_file(path, contents);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        self.lock().fs.add_dir(path);
    }

    /// Current contents of a file
    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock().fs.files.get(path.as_ref()).cloned()
    }

    /// Every file write so far, in order
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.lock().writes.clone()
    }

    /// Bytes written to descriptors that are not backed by a file
    pub fn device_writes(&self) -> Vec<(RawFd, Vec<u8>)> {
        self.lock().device_writes.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Request words of every ioctl issued so far
    pub fn ioctl_requests(&self) -> Vec<u32> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Ioctl { request, .. } => Some(*request),
                _ => None,
            })
            .collect()
    }

    pub fn is_open(&self, fd: RawFd) -> bool {
        self.lock().open.contains_key(&fd)
    }

    /// Number of descriptors currently open
    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }

    /// Allocate an open descriptor with no file behind it
    pub fn reserve_fd(&self) -> RawFd {
        let mut state = self.lock();
        let fd = state.next_fd;
        state.next_fd += 1;
        state.open.insert(fd, OpenFile { path: None, pos: 0 });
        fd
    }

    /// Handle `request`, exposing its encoded payload size to the handler
    pub fn on_ioctl<F>(&self, request: u32, handler: F)
    where
        F: FnMut(RawFd, &mut [u8]) -> std::result::Result<i32, Errno> + Send + 'static,
    {
        self.on_ioctl_sized(request, encoded_size(request), handler);
    }

    /// Handle `request`, whose argument is `size` bytes
    pub fn on_ioctl_sized<F>(&self, request: u32, size: usize, handler: F)
    where
        F: FnMut(RawFd, &mut [u8]) -> std::result::Result<i32, Errno> + Send + 'static,
    {
        self.lock()
            .handlers
            .insert(request, (size, Box::new(handler)));
    }

    /// Run `hook` after every write to `path`
    pub fn on_write<F>(&self, path: impl Into<PathBuf>, hook: F)
    where
        F: FnMut(&mut FakeFs, &str) + Send + 'static,
    {
        self.lock().write_hooks.push((path.into(), Box::new(hook)));
    }

    pub fn fail_open(&self, path: impl Into<PathBuf>, errno: Errno) {
        self.lock().open_failures.insert(path.into(), errno);
    }

    /// Make closing any descriptor opened on `path` report `errno`
    ///
    /// The descriptor is released anyway, as Linux does.
    pub fn fail_close(&self, path: impl Into<PathBuf>, errno: Errno) {
        self.lock().close_failures.insert(path.into(), errno);
    }

    /// Report `flags` (e.g. `POLLHUP`) on every later poll of `fd`
    pub fn raise_poll_condition(&self, fd: RawFd, flags: PollFlags) {
        self.lock().conditions.insert(fd, flags);
        self.readable.notify_all();
    }

    /// Make the next poll fail with `errno`
    pub fn fail_next_poll(&self, errno: Errno) {
        self.lock().poll_failures.push_back(errno);
    }

    /// Queue bytes to be returned by the next read on `fd`
    pub fn push_readable(&self, fd: RawFd, bytes: Vec<u8>) {
        self.lock().readable.entry(fd).or_default().push_back(bytes);
        self.readable.notify_all();
    }

    /// Whether queued data on `fd` is still unread
    pub fn has_readable(&self, fd: RawFd) -> bool {
        self.lock()
            .readable
            .get(&fd)
            .is_some_and(|q| !q.is_empty())
    }

    fn ready(state: &State, fds: &mut [PollFd]) -> usize {
        let mut ready = 0;
        for pfd in fds.iter_mut() {
            pfd.revents = 0;
            let queued = state
                .readable
                .get(&pfd.fd)
                .is_some_and(|q| !q.is_empty());
            let mut revents = state
                .conditions
                .get(&pfd.fd)
                .copied()
                .unwrap_or(PollFlags::empty());
            if queued && PollFlags::from_bits_truncate(pfd.events).contains(PollFlags::POLLIN) {
                revents |= PollFlags::POLLIN;
            }
            if !revents.is_empty() {
                pfd.revents = revents.bits();
                ready += 1;
            }
        }
        ready
    }
}

fn check_open(state: &State, symbol: native::NativeCall, fd: RawFd) -> Result<()> {
    if state.open.contains_key(&fd) {
        Ok(())
    } else {
        Err(symbol.fail(Errno::EBADF))
    }
}

impl Syscalls for FakeKernel {
    fn open(&self, path: &Path, _flags: OFlag) -> Result<RawFd> {
        let mut state = self.lock();
        state.calls.push(Call::Open(path.to_path_buf()));
        if let Some(errno) = state.open_failures.get(path) {
            return Err(native::OPEN.fail(*errno));
        }
        if !state.fs.exists(path) {
            return Err(native::OPEN.fail(Errno::ENOENT));
        }
        let fd = state.next_fd;
        state.next_fd += 1;
        state.open.insert(
            fd,
            OpenFile {
                path: Some(path.to_path_buf()),
                pos: 0,
            },
        );
        Ok(fd)
    }

    fn close(&self, fd: RawFd) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Close(fd));
        check_open(&state, native::CLOSE, fd)?;
        let file = state.open.remove(&fd);
        let failure = file
            .and_then(|f| f.path)
            .and_then(|path| state.close_failures.get(&path).copied());
        match failure {
            Some(errno) => Err(native::CLOSE.fail(errno)),
            None => Ok(()),
        }
    }

    fn read(&self, fd: RawFd, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        state.calls.push(Call::Read(fd));
        check_open(&state, native::READ, fd)?;

        let State {
            fs, open, readable, ..
        } = &mut *state;
        let file = open.get_mut(&fd).ok_or(native::READ.fail(Errno::EBADF))?;

        if let Some(path) = &file.path {
            let contents = fs.files.get(path).map(String::as_bytes).unwrap_or(&[]);
            let rest = contents.get(file.pos..).unwrap_or(&[]);
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            file.pos += n;
            return Ok(n);
        }

        let mut n = 0;
        if let Some(queue) = readable.get_mut(&fd) {
            while let Some(chunk) = queue.front() {
                if n + chunk.len() > buf.len() {
                    break;
                }
                buf[n..n + chunk.len()].copy_from_slice(chunk);
                n += chunk.len();
                queue.pop_front();
            }
        }
        if n == 0 {
            return Err(native::READ.fail(Errno::EAGAIN));
        }
        Ok(n)
    }

    fn write(&self, fd: RawFd, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        state.calls.push(Call::Write(fd));
        check_open(&state, native::WRITE, fd)?;

        let path = state.open.get(&fd).and_then(|f| f.path.clone());
        let Some(path) = path else {
            state.device_writes.push((fd, buf.to_vec()));
            return Ok(buf.len());
        };

        let text = String::from_utf8_lossy(buf).into_owned();
        state.fs.files.insert(path.clone(), text.clone());
        state.writes.push((path.clone(), text.clone()));

        let State {
            fs, write_hooks, ..
        } = &mut *state;
        for (hook_path, hook) in write_hooks.iter_mut() {
            if *hook_path == path {
                hook(fs, &text);
            }
        }
        Ok(buf.len())
    }

    unsafe fn ioctl(&self, fd: RawFd, request: u32, arg: *mut c_void) -> Result<libc::c_int> {
        let mut state = self.lock();
        state.calls.push(Call::Ioctl { fd, request });
        check_open(&state, native::IOCTL, fd)?;

        let Some((size, handler)) = state.handlers.get_mut(&request) else {
            return Err(native::IOCTL.fail(Errno::ENOTTY));
        };
        // SAFETY: the caller guarantees `arg` points to the `size` bytes the
        // request carries
        let buf = unsafe { std::slice::from_raw_parts_mut(arg.cast::<u8>(), *size) };
        handler(fd, buf).map_err(|errno| native::IOCTL.fail(errno))
    }

    fn poll(&self, fds: &mut [PollFd], timeout_ms: i32) -> Result<usize> {
        let mut state = self.lock();
        state.calls.push(Call::Poll);
        if let Some(errno) = state.poll_failures.pop_front() {
            return Err(native::POLL.fail(errno));
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(0) as u64);
        loop {
            let ready = Self::ready(&state, fds);
            if ready > 0 {
                return Ok(ready);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            state = self
                .readable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().fs.exists(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_hook_creates_directory() {
        let kernel = FakeKernel::new();
        kernel.add_file("/sys/class/pwm/pwmchip0/export", "");
        kernel.on_write("/sys/class/pwm/pwmchip0/export", |fs, value| {
            fs.add_file(
                format!("/sys/class/pwm/pwmchip0/pwm{}/enable", value.trim()),
                "0\n",
            );
        });

        let fd = kernel
            .open(Path::new("/sys/class/pwm/pwmchip0/export"), OFlag::O_WRONLY)
            .unwrap();
        kernel.write(fd, b"1").unwrap();
        assert!(kernel.exists(Path::new("/sys/class/pwm/pwmchip0/pwm1")));
        assert_eq!(
            kernel.file("/sys/class/pwm/pwmchip0/pwm1/enable").as_deref(),
            Some("0\n")
        );
    }

    #[test]
    fn test_poll_times_out_without_data() {
        let kernel = FakeKernel::new();
        let fd = kernel.reserve_fd();
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        assert_eq!(kernel.poll(&mut fds, 5).unwrap(), 0);

        kernel.push_readable(fd, vec![1, 2, 3]);
        assert_eq!(kernel.poll(&mut fds, 5).unwrap(), 1);
        let mut buf = [0u8; 8];
        assert_eq!(kernel.read(fd, &mut buf).unwrap(), 3);
        assert!(!kernel.has_readable(fd));
    }

    #[test]
    fn test_close_failure_still_releases() {
        let kernel = FakeKernel::new();
        kernel.add_file("/dev/i2c-1", "");
        kernel.fail_close("/dev/i2c-1", Errno::EIO);
        let fd = kernel.open(Path::new("/dev/i2c-1"), OFlag::O_RDWR).unwrap();
        let err = kernel.close(fd).unwrap_err();
        assert_eq!(err.errno(), Some(Errno::EIO));
        assert!(!kernel.is_open(fd));
    }

    #[test]
    fn test_unhandled_ioctl_is_enotty() {
        let kernel = FakeKernel::new();
        let fd = kernel.reserve_fd();
        let mut word = 0u32;
        let err = unsafe { kernel.ioctl(fd, 0x1234, (&mut word as *mut u32).cast()) }.unwrap_err();
        assert_eq!(err.errno(), Some(Errno::ENOTTY));
    }
}
