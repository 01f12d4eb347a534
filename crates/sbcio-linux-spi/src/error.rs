//! Error types for Linux SPI operations

use sbcio_core::{DeviceError, ErrorKind};
use sbcio_sys::SysError;
use thiserror::Error;

/// Linux SPI specific errors
#[derive(Debug, Error)]
pub enum LinuxSpiError {
    #[error(transparent)]
    Sys(#[from] SysError),

    /// The device refused a setting
    #[error("Failed to set SPI {setting} to {value}: {source}")]
    Configure {
        setting: &'static str,
        value: String,
        #[source]
        source: SysError,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl DeviceError for LinuxSpiError {
    fn kind(&self) -> ErrorKind {
        match self {
            LinuxSpiError::Sys(e) => e.kind(),
            LinuxSpiError::Configure { source, .. } => source.kind(),
            LinuxSpiError::InvalidParameter(_) => ErrorKind::InvalidArgument,
        }
    }
}

/// Result type for Linux SPI operations
pub type Result<T> = std::result::Result<T, LinuxSpiError>;
