//! Error types for Linux PWM operations

use sbcio_core::{DeviceError, ErrorKind};
use sbcio_sys::SysError;
use thiserror::Error;

/// Linux PWM specific errors
#[derive(Debug, Error)]
pub enum LinuxPwmError {
    #[error(transparent)]
    Sys(#[from] SysError),

    #[error("PWM chip not found: {0}")]
    ChipNotFound(String),

    #[error("PWM channel {channel} out of range (chip has {npwm})")]
    ChannelOutOfRange { channel: u32, npwm: u64 },

    /// The exported channel directory never appeared
    #[error("{path} did not appear after {attempts} attempts")]
    ExportTimeout { path: String, attempts: u32 },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DeviceError for LinuxPwmError {
    fn kind(&self) -> ErrorKind {
        match self {
            LinuxPwmError::Sys(e) => e.kind(),
            LinuxPwmError::ChipNotFound(_) => ErrorKind::IllegalState,
            LinuxPwmError::ExportTimeout { .. } => ErrorKind::Timeout,
            LinuxPwmError::ChannelOutOfRange { .. } | LinuxPwmError::InvalidParameter(_) => {
                ErrorKind::InvalidArgument
            }
        }
    }
}

/// Result type for Linux PWM operations
pub type Result<T> = std::result::Result<T, LinuxPwmError>;
