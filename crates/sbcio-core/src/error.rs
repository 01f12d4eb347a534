//! Error classification shared by all device crates

use thiserror::Error;

/// Broad class of a device failure
///
/// Each device crate has its own error type; `kind()` on those maps them onto
/// this common taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A native call faulted outright
    NativeCall,
    /// A syscall failed and reported errno
    CapturedState,
    /// A protocol precondition did not hold
    IllegalState,
    /// A bounded wait ran out
    Timeout,
    /// The caller passed an unusable argument
    InvalidArgument,
    /// The device was already closed
    InvalidDescriptor,
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ErrorKind::NativeCall => "native call",
            ErrorKind::CapturedState => "system call",
            ErrorKind::IllegalState => "illegal state",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidDescriptor => "invalid descriptor",
        };
        f.write_str(s)
    }
}

/// Errors loading device configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Duplicate device id {0:?}")]
    DuplicateId(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}
