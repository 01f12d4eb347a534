//! CLI command implementations
//!
//! Each device kind has its own module, compiled only when the matching
//! cargo feature is enabled. Devices are resolved through
//! [`crate::devices::Registry`].

#[cfg(feature = "gpio")]
pub mod gpio;
#[cfg(feature = "i2c")]
pub mod i2c;
mod list;
#[cfg(feature = "pwm")]
pub mod pwm;
#[cfg(feature = "spi")]
pub mod spi;

pub use list::list_devices;

/// Format bytes as space separated hex
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
