//! Error types for native calls and kernel structure marshaling

use nix::errno::Errno;
use sbcio_core::ErrorKind;
use thiserror::Error;

/// Errors raised at the kernel boundary
#[derive(Debug, Error)]
pub enum SysError {
    /// A plain native call faulted
    #[error("native call {symbol} failed: {source}")]
    NativeCall {
        symbol: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A syscall reported failure through errno
    #[error("{symbol} failed with errno {errno}: {message}")]
    CapturedState {
        symbol: &'static str,
        errno: i32,
        message: String,
    },

    /// The descriptor was already closed
    #[error("invalid descriptor (already closed)")]
    InvalidDescriptor,

    /// Encoded ioctl payload size disagrees with the marshaled structure
    #[error("ioctl {request:#010x} encodes {encoded} bytes but {layout} is {actual} bytes")]
    SizeMismatch {
        request: u32,
        layout: &'static str,
        encoded: usize,
        actual: usize,
    },

    /// Buffer shorter than the structure being read from it
    #[error("buffer of {actual} bytes is too small for {layout} ({needed} bytes)")]
    BufferTooSmall {
        layout: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A fixed-capacity kernel array is full
    #[error("too many {what} (kernel limit is {capacity})")]
    CapacityExceeded { what: &'static str, capacity: usize },

    /// poll reported an error or hangup condition on the descriptor
    #[error("descriptor {fd} reported {revents:?}")]
    PollCondition { fd: i32, revents: nix::poll::PollFlags },

    /// Path cannot be passed to the kernel
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Sysfs attribute did not hold the expected value
    #[error("cannot parse {path}: {value:?}")]
    Parse { path: String, value: String },
}

impl SysError {
    /// Build a captured-state error from an errno value
    pub fn captured(symbol: &'static str, errno: Errno) -> Self {
        SysError::CapturedState {
            symbol,
            errno: errno as i32,
            message: errno.desc().to_string(),
        }
    }

    /// The errno carried by this error, if any
    pub fn errno(&self) -> Option<Errno> {
        match self {
            SysError::CapturedState { errno, .. } => Some(Errno::from_raw(*errno)),
            SysError::NativeCall { source, .. } => source.raw_os_error().map(Errno::from_raw),
            _ => None,
        }
    }

    /// Classify for callers that handle every bus alike
    pub fn kind(&self) -> ErrorKind {
        match self {
            SysError::NativeCall { .. } => ErrorKind::NativeCall,
            SysError::CapturedState { .. } => ErrorKind::CapturedState,
            SysError::InvalidDescriptor => ErrorKind::InvalidDescriptor,
            SysError::Parse { .. } | SysError::PollCondition { .. } => ErrorKind::IllegalState,
            SysError::SizeMismatch { .. }
            | SysError::BufferTooSmall { .. }
            | SysError::CapacityExceeded { .. }
            | SysError::InvalidPath(_) => ErrorKind::InvalidArgument,
        }
    }

    /// True when the call was interrupted by a signal and may simply be repeated
    pub fn is_interrupted(&self) -> bool {
        self.errno() == Some(Errno::EINTR)
    }
}

/// Result type for kernel boundary operations
pub type Result<T> = std::result::Result<T, SysError>;
