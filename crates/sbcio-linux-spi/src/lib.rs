//! sbcio-linux-spi - Linux spidev support
//!
//! SPI controllers are exposed by Linux as character devices at
//! `/dev/spidevX.Y`, where X is the bus number and Y is the chip select.
//!
//! # Example
//!
//! ```no_run
//! use sbcio_core::{Provider, SpiConfig, SpiDevice};
//! use sbcio_linux_spi::LinuxSpiProvider;
//!
//! let spi = LinuxSpiProvider::new().create(
//!     &SpiConfig::new(0, 0).with_baud_rate(4_000_000).with_mode(0),
//! )?;
//!
//! // Read a JEDEC ID without releasing chip select
//! let mut id = [0u8; 3];
//! spi.write_read(&[0x9F], &mut id)?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the sbcio CLI
//!
//! ```bash
//! sbcio spi transfer dev=/dev/spidev0.0,spispeed=4000 9f000000
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y`
//! - May require adding user to `spi` group or using udev rules

pub mod device;
pub mod error;

// Re-exports
pub use device::{mode, parse_options, LinuxSpiDevice, LinuxSpiProvider};
pub use error::{LinuxSpiError, Result};

use sbcio_core::Provider;

/// Open a spidev device from CLI-style options
///
/// # Example Options
///
/// - `dev=/dev/spidev0.0` - Device path (or `bus=0,cs=0`)
/// - `spispeed=4000` - Optional: speed in kHz (default: 500)
/// - `mode=0` - Optional: SPI mode 0-3 (default: 0)
pub fn open_linux_spi(
    options: &[(&str, &str)],
) -> std::result::Result<LinuxSpiDevice, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    Ok(LinuxSpiProvider::new().create(&config)?)
}
