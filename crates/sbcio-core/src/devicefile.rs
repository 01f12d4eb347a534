//! TOML device files
//!
//! A device file names devices so they can be referred to by id:
//!
//! ```toml
//! [[gpio]]
//! id = "button"
//! chip = "/dev/gpiochip0"
//! pins = [17]
//! mode = "input-pull-up"
//! event_mode = "falling"
//! debounce_micros = 5000
//!
//! [[spi]]
//! id = "flash"
//! bus = 0
//! chip_select = 0
//! baud_rate = 1000000
//!
//! [[i2c]]
//! id = "sensors"
//! bus = 1
//!
//! [[pwm]]
//! id = "buzzer"
//! chip = 0
//! channel = 1
//! frequency = 2000
//! duty_cycle = 50
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::{GpioPortConfig, I2cConfig, PwmConfig, SpiConfig};
use crate::error::ConfigError;

/// Default GPIO character device
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

fn default_chip() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_CHIP)
}

/// A GPIO port together with the chip it lives on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GpioEntry {
    #[serde(default = "default_chip")]
    pub chip: PathBuf,
    #[serde(flatten)]
    pub port: GpioPortConfig,
}

/// All devices declared in one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceFile {
    pub gpio: Vec<GpioEntry>,
    pub spi: Vec<SpiConfig>,
    pub i2c: Vec<I2cConfig>,
    pub pwm: Vec<PwmConfig>,
}

impl DeviceFile {
    /// Load a device file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse device file text; `origin` only labels errors
    pub fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: DeviceFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        file.check_ids()?;
        log::debug!(
            "config: {} gpio, {} spi, {} i2c, {} pwm device(s) from {}",
            file.gpio.len(),
            file.spi.len(),
            file.i2c.len(),
            file.pwm.len(),
            origin
        );
        Ok(file)
    }

    fn check_ids(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let ids = self
            .gpio
            .iter()
            .map(|g| &g.port.id)
            .chain(self.spi.iter().map(|s| &s.id))
            .chain(self.i2c.iter().map(|i| &i.id))
            .chain(self.pwm.iter().map(|p| &p.id));
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateId(id.clone()));
            }
        }
        Ok(())
    }

    pub fn gpio(&self, id: &str) -> Option<&GpioEntry> {
        self.gpio.iter().find(|g| g.port.id == id)
    }

    pub fn spi(&self, id: &str) -> Option<&SpiConfig> {
        self.spi.iter().find(|s| s.id == id)
    }

    pub fn i2c(&self, id: &str) -> Option<&I2cConfig> {
        self.i2c.iter().find(|i| i.id == id)
    }

    pub fn pwm(&self, id: &str) -> Option<&PwmConfig> {
        self.pwm.iter().find(|p| p.id == id)
    }
}
