//! Kernel user-space ABI definitions
//!
//! Structures are declared exactly as in the kernel headers
//! (`linux/gpio.h`, `linux/spi/spidev.h`, `linux/i2c.h`, `linux/i2c-dev.h`),
//! with all padding spelled out.

pub mod gpio;
pub mod i2c;
pub mod spi;
