//! sbcio-linux-gpio - Linux GPIO character device support
//!
//! Ports are groups of lines on one `/dev/gpiochipN`, acquired atomically
//! through the v2 line request uAPI and read or written as one bit-packed
//! value.
//!
//! # Example
//!
//! ```no_run
//! use sbcio_core::{GpioEventMode, GpioPort, GpioPortConfig, GpioPortMode, Provider};
//! use sbcio_linux_gpio::LinuxGpioProvider;
//! use std::sync::Arc;
//!
//! let provider = LinuxGpioProvider::new("/dev/gpiochip0");
//!
//! let leds = provider.create(
//!     &GpioPortConfig::new("leds", &[5, 6]).with_mode(GpioPortMode::Output),
//! )?;
//! leds.write(0b10)?;
//!
//! let button = provider.create(
//!     &GpioPortConfig::new("button", &[17])
//!         .with_mode(GpioPortMode::InputPullUp)
//!         .with_event_mode(GpioEventMode::Falling)
//!         .with_debounce_micros(5000),
//! )?;
//! button.add_listener(Arc::new(|event| println!("{:?}", event)))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the sbcio CLI
//!
//! ```bash
//! sbcio gpio read chip=0,pins=17+27
//! sbcio gpio watch chip=0,pins=17,mode=pull-up,edge=falling,debounce=5000
//! ```
//!
//! # System Requirements
//!
//! - Linux 5.10 or newer (GPIO uAPI v2)
//! - Read/write access to `/dev/gpiochipN`

pub mod chip;
pub mod debounce;
pub mod error;
pub mod poller;
pub mod port;

// Re-exports
pub use chip::GpioChip;
pub use debounce::{DebounceFilter, DebounceStrategy};
pub use error::{LinuxGpioError, Result};
pub use poller::EventPoller;
pub use port::{
    parse_options, DebounceMode, GpioLinePort, GpioProviderOptions, GpioTarget,
    LinuxGpioProvider, DEFAULT_CHIP,
};

use sbcio_core::Provider;

/// Open a port from CLI-style options
///
/// # Example Options
///
/// - `chip=0` - Optional: chip number or path (default: /dev/gpiochip0)
/// - `pins=17+27` - Required: line offsets
/// - `mode=output` - Optional: line mode (default: input)
/// - `debounce=5000,debounce_mode=trailing` - Optional: debounce window and strategy
pub fn open_linux_gpio(
    options: &[(&str, &str)],
) -> std::result::Result<GpioLinePort, Box<dyn std::error::Error>> {
    let target = parse_options(options)?;
    let provider = LinuxGpioProvider::new(target.chip).with_options(GpioProviderOptions {
        debounce: target.debounce,
        ..Default::default()
    });
    Ok(provider.create(&target.port)?)
}
