//! sbcio-linux-i2c - Linux i2c-dev support
//!
//! I2C adapters are exposed by Linux as character devices at `/dev/i2c-N`.
//! Each transfer is submitted with `I2C_RDWR`, so register reads keep the
//! bus between the address write and the data read.
//!
//! # Example
//!
//! ```no_run
//! use sbcio_core::{I2cConfig, I2cDevice, Provider};
//! use sbcio_linux_i2c::LinuxI2cProvider;
//!
//! let i2c = LinuxI2cProvider::new().create(&I2cConfig::new(1))?;
//!
//! let mut temp = [0u8; 2];
//! i2c.read_register(0x48, 0x00, &mut temp)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the sbcio CLI
//!
//! ```bash
//! sbcio i2c read-reg bus=1 0x48 0x00 2
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with `CONFIG_I2C_CHARDEV` (or the `i2c-dev` module loaded)
//! - Read/write access to `/dev/i2c-N`, usually via the `i2c` group

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxI2cDevice, LinuxI2cProvider, DEFAULT_DEV_ROOT};
pub use error::{LinuxI2cError, Result};

use sbcio_core::Provider;

/// Open an i2c-dev adapter from CLI-style options
///
/// # Example Options
///
/// - `bus=1` - Adapter number (or `dev=/dev/i2c-1`)
pub fn open_linux_i2c(
    options: &[(&str, &str)],
) -> std::result::Result<LinuxI2cDevice, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    Ok(LinuxI2cProvider::new().create(&config)?)
}
