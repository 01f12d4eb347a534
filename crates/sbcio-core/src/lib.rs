//! sbcio-core - Device contracts for single-board-computer I/O
//!
//! This crate defines what callers program against: configuration values,
//! the [`Provider`]/[`Device`] pair, and one trait per bus ([`GpioPort`],
//! [`SpiDevice`], [`I2cDevice`], [`PwmChannel`]). Implementations live in the
//! `sbcio-linux-*` crates.

pub mod config;
pub mod device;
pub mod devicefile;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod pwm;
pub mod spi;

pub use config::{
    GpioEventMode, GpioPortConfig, GpioPortMode, I2cConfig, Polarity, PwmConfig, SpiConfig,
};
pub use device::{Device, DeviceError, Provider};
pub use devicefile::{DeviceFile, GpioEntry};
pub use error::{ConfigError, ErrorKind};
pub use gpio::{Edge, GpioEvent, GpioListener, GpioPort, ListenerId};
pub use i2c::{I2cDevice, I2cMessage};
pub use pwm::PwmChannel;
pub use spi::{SpiDevice, SpiMessage};
