//! Error types for Linux GPIO operations

use sbcio_core::{DeviceError, ErrorKind};
use sbcio_sys::SysError;
use thiserror::Error;

/// Linux GPIO specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    #[error(transparent)]
    Sys(#[from] SysError),

    /// A requested line is held by another consumer
    #[error("Line {offset} is already in use by {consumer:?}")]
    LineInUse { offset: u32, consumer: String },

    /// Listeners need a port configured for edge events
    #[error("Port {0} has no edge detection configured")]
    EdgeDetectionDisabled(String),

    /// The event thread could not be started
    #[error("Failed to start event poller: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DeviceError for LinuxGpioError {
    fn kind(&self) -> ErrorKind {
        match self {
            LinuxGpioError::Sys(e) => e.kind(),
            LinuxGpioError::LineInUse { .. } | LinuxGpioError::EdgeDetectionDisabled(_) => {
                ErrorKind::IllegalState
            }
            LinuxGpioError::Spawn(_) => ErrorKind::NativeCall,
            LinuxGpioError::InvalidParameter(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Result type for Linux GPIO operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
