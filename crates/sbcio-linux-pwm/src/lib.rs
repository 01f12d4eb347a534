//! sbcio-linux-pwm - Linux sysfs PWM support
//!
//! PWM controllers appear under `/sys/class/pwm/pwmchipN`. A channel is
//! exported by writing its index to `export`, after which its attributes
//! live in `pwmchipN/pwmM/`.
//!
//! # Example
//!
//! ```no_run
//! use sbcio_core::{PwmChannel, PwmConfig, Provider};
//! use sbcio_linux_pwm::LinuxPwmProvider;
//!
//! let buzzer = LinuxPwmProvider::new().create(
//!     &PwmConfig::new(0, 1).with_frequency(2_000).with_duty_cycle(50),
//! )?;
//! buzzer.on()?;
//! buzzer.set_frequency(2_500)?;
//! buzzer.off()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with the sbcio CLI
//!
//! ```bash
//! sbcio pwm set chip=0,channel=1,frequency=2000,duty=50
//! sbcio pwm off chip=0,channel=1
//! ```
//!
//! # System Requirements
//!
//! - A PWM driver bound to the controller (often a device tree overlay)
//! - Write access to `/sys/class/pwm/pwmchipN/export` and the channel files

pub mod channel;
pub mod error;

// Re-exports
pub use channel::{
    parse_options, LinuxPwmChannel, LinuxPwmProvider, PwmProviderOptions, DEFAULT_SYSFS_ROOT,
};
pub use error::{LinuxPwmError, Result};

use sbcio_core::Provider;

/// Open a PWM channel from CLI-style options
///
/// # Example Options
///
/// - `chip=0` - Optional: PWM chip number (default: 0)
/// - `channel=1` - Optional: channel index (default: 0)
/// - `frequency=440` - Optional: frequency in Hz
/// - `duty=50` - Optional: duty cycle in percent
pub fn open_linux_pwm(
    options: &[(&str, &str)],
) -> std::result::Result<LinuxPwmChannel, Box<dyn std::error::Error>> {
    let config = parse_options(options)?;
    Ok(LinuxPwmProvider::new().create(&config)?)
}
