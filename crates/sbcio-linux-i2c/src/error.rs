//! Error types for Linux I2C operations

use sbcio_core::{DeviceError, ErrorKind};
use sbcio_sys::SysError;
use thiserror::Error;

/// Linux I2C specific errors
#[derive(Debug, Error)]
pub enum LinuxI2cError {
    #[error(transparent)]
    Sys(#[from] SysError),

    /// The adapter cannot run plain I2C message arrays
    #[error("{path} does not support I2C transfers (functionality {funcs:#x})")]
    MissingCapability { path: String, funcs: u64 },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DeviceError for LinuxI2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            LinuxI2cError::Sys(e) => e.kind(),
            LinuxI2cError::MissingCapability { .. } => ErrorKind::IllegalState,
            LinuxI2cError::InvalidParameter(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Result type for Linux I2C operations
pub type Result<T> = std::result::Result<T, LinuxI2cError>;
