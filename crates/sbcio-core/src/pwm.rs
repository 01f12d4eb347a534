//! PWM channel contract

use crate::config::{Polarity, PwmConfig};
use crate::device::Device;

/// One PWM output
///
/// Setters apply immediately. Closing a channel disables its output.
pub trait PwmChannel: Device<Config = PwmConfig> {
    fn set_frequency(&self, hz: u32) -> Result<(), Self::Error>;

    /// Duty cycle in percent, 0-100
    fn set_duty_cycle(&self, percent: u8) -> Result<(), Self::Error>;

    fn set_polarity(&self, polarity: Polarity) -> Result<(), Self::Error>;

    /// Apply the current settings and enable the output
    fn on(&self) -> Result<(), Self::Error>;

    fn off(&self) -> Result<(), Self::Error>;

    /// Whether the hardware reports the output enabled
    fn is_enabled(&self) -> Result<bool, Self::Error>;
}
