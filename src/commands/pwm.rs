//! PWM commands

use crate::cli::PwmCommands;
use crate::devices::Registry;

use sbcio_core::{Device, Polarity, PwmChannel};
use std::error::Error;

pub fn run(command: PwmCommands, registry: &Registry) -> Result<(), Box<dyn Error>> {
    match command {
        PwmCommands::Set {
            device,
            frequency,
            duty,
            polarity,
        } => {
            let channel = registry.open_pwm(&device)?;
            if let Some(hz) = frequency {
                channel.set_frequency(hz)?;
            }
            if let Some(percent) = duty {
                channel.set_duty_cycle(percent)?;
            }
            if let Some(polarity) = polarity {
                channel.set_polarity(polarity.parse::<Polarity>()?)?;
            }
            channel.on()?;
            // Left running after exit; `pwm off` disables it
            log::info!("{} enabled", channel.sysfs_dir().path().display());
        }
        PwmCommands::Off { device } => {
            let channel = registry.open_pwm(&device)?;
            channel.off()?;
            channel.close()?;
        }
    }
    Ok(())
}
