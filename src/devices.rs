//! Device registration and lookup
//!
//! Commands take a device argument that is either a list of options
//! (`bus=1`, `chip=0,pins=17+27`) or `@id`, naming an entry of the
//! `--config` device file.

use sbcio_core::{ConfigError, DeviceFile};
use std::error::Error;
use std::path::Path;

/// Information about a device kind
pub struct DeviceKindInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Example device argument
    pub example: &'static str,
}

/// Device kinds enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_kinds() -> Vec<DeviceKindInfo> {
    let mut kinds = Vec::new();

    #[cfg(feature = "gpio")]
    kinds.push(DeviceKindInfo {
        name: "gpio",
        description: "GPIO character device ports (uAPI v2)",
        example: "chip=0,pins=17+27,mode=pull-up,edge=falling,debounce=5000",
    });

    #[cfg(feature = "spi")]
    kinds.push(DeviceKindInfo {
        name: "spi",
        description: "spidev full-duplex transfers",
        example: "dev=/dev/spidev0.0,spispeed=4000,mode=0",
    });

    #[cfg(feature = "i2c")]
    kinds.push(DeviceKindInfo {
        name: "i2c",
        description: "i2c-dev combined transfers",
        example: "bus=1",
    });

    #[cfg(feature = "pwm")]
    kinds.push(DeviceKindInfo {
        name: "pwm",
        description: "sysfs PWM channels",
        example: "chip=0,channel=1,frequency=2000,duty=50",
    });

    kinds
}

/// Split `key=value,key=value` into pairs
///
/// Entries without `=` are ignored.
pub fn parse_device_string(s: &str) -> Vec<(&str, &str)> {
    s.split(',')
        .filter_map(|opt| opt.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

/// How a command names its device
#[derive(Debug, PartialEq, Eq)]
pub enum DeviceArg<'a> {
    Named(&'a str),
    Options(Vec<(&'a str, &'a str)>),
}

impl<'a> DeviceArg<'a> {
    pub fn parse(s: &'a str) -> Self {
        match s.strip_prefix('@') {
            Some(id) => DeviceArg::Named(id),
            None => DeviceArg::Options(parse_device_string(s)),
        }
    }
}

/// Devices known to this invocation
#[derive(Debug, Default)]
pub struct Registry {
    file: Option<DeviceFile>,
}

impl Registry {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(DeviceFile::load).transpose()?;
        Ok(Self { file })
    }

    #[cfg(test)]
    fn from_file(file: DeviceFile) -> Self {
        Self { file: Some(file) }
    }

    pub fn file(&self) -> Option<&DeviceFile> {
        self.file.as_ref()
    }

    fn device_file(&self, kind: &str, id: &str) -> Result<&DeviceFile, Box<dyn Error>> {
        self.file.as_ref().ok_or_else(|| {
            format!(
                "{} device '@{}' needs a device file (use --config <devices.toml>)",
                kind, id
            )
            .into()
        })
    }

    #[cfg(feature = "gpio")]
    pub fn open_gpio(&self, arg: &str) -> Result<sbcio_linux_gpio::GpioLinePort, Box<dyn Error>> {
        use sbcio_core::Provider;
        use sbcio_linux_gpio::LinuxGpioProvider;

        match DeviceArg::parse(arg) {
            DeviceArg::Named(id) => {
                let entry = self
                    .device_file("gpio", id)?
                    .gpio(id)
                    .ok_or_else(|| unknown_device("gpio", id))?;
                log::info!("Opening GPIO port '{}' on {}", id, entry.chip.display());
                let port = LinuxGpioProvider::new(entry.chip.clone())
                    .create(&entry.port)
                    .map_err(|e| format!("Failed to open GPIO port '{}': {}", id, e))?;
                Ok(port)
            }
            DeviceArg::Options(options) => {
                sbcio_linux_gpio::open_linux_gpio(&options).map_err(|e| {
                    format!(
                        "Failed to open GPIO port: {}\n\
                         Make sure the chip exists and you have read/write permissions.\n\
                         You may need to: sudo usermod -aG gpio $USER",
                        e
                    )
                    .into()
                })
            }
        }
    }

    #[cfg(feature = "spi")]
    pub fn open_spi(&self, arg: &str) -> Result<sbcio_linux_spi::LinuxSpiDevice, Box<dyn Error>> {
        use sbcio_core::Provider;
        use sbcio_linux_spi::LinuxSpiProvider;

        match DeviceArg::parse(arg) {
            DeviceArg::Named(id) => {
                let config = self
                    .device_file("spi", id)?
                    .spi(id)
                    .ok_or_else(|| unknown_device("spi", id))?;
                let device = LinuxSpiProvider::new()
                    .create(config)
                    .map_err(|e| format!("Failed to open SPI device '{}': {}", id, e))?;
                Ok(device)
            }
            DeviceArg::Options(options) => {
                sbcio_linux_spi::open_linux_spi(&options).map_err(|e| {
                    format!(
                        "Failed to open Linux SPI device: {}\n\
                         Make sure the device exists and you have read/write permissions.\n\
                         You may need to: sudo usermod -aG spi $USER",
                        e
                    )
                    .into()
                })
            }
        }
    }

    #[cfg(feature = "i2c")]
    pub fn open_i2c(&self, arg: &str) -> Result<sbcio_linux_i2c::LinuxI2cDevice, Box<dyn Error>> {
        use sbcio_core::Provider;
        use sbcio_linux_i2c::LinuxI2cProvider;

        match DeviceArg::parse(arg) {
            DeviceArg::Named(id) => {
                let config = self
                    .device_file("i2c", id)?
                    .i2c(id)
                    .ok_or_else(|| unknown_device("i2c", id))?;
                let device = LinuxI2cProvider::new()
                    .create(config)
                    .map_err(|e| format!("Failed to open I2C bus '{}': {}", id, e))?;
                Ok(device)
            }
            DeviceArg::Options(options) => {
                sbcio_linux_i2c::open_linux_i2c(&options).map_err(|e| {
                    format!(
                        "Failed to open I2C bus: {}\n\
                         Make sure i2c-dev is loaded (sudo modprobe i2c-dev).\n\
                         You may need to: sudo usermod -aG i2c $USER",
                        e
                    )
                    .into()
                })
            }
        }
    }

    #[cfg(feature = "pwm")]
    pub fn open_pwm(&self, arg: &str) -> Result<sbcio_linux_pwm::LinuxPwmChannel, Box<dyn Error>> {
        use sbcio_core::Provider;
        use sbcio_linux_pwm::LinuxPwmProvider;

        match DeviceArg::parse(arg) {
            DeviceArg::Named(id) => {
                let config = self
                    .device_file("pwm", id)?
                    .pwm(id)
                    .ok_or_else(|| unknown_device("pwm", id))?;
                let channel = LinuxPwmProvider::new()
                    .create(config)
                    .map_err(|e| format!("Failed to open PWM channel '{}': {}", id, e))?;
                Ok(channel)
            }
            DeviceArg::Options(options) => sbcio_linux_pwm::open_linux_pwm(&options)
                .map_err(|e| format!("Failed to open PWM channel: {}", e).into()),
        }
    }
}

/// Error for a command whose device kind was compiled out
#[allow(dead_code)]
pub fn not_built(kind: &str) -> Box<dyn Error> {
    format!(
        "{} support is not enabled (recompile with --features {})",
        kind, kind
    )
    .into()
}

fn unknown_device(kind: &str, id: &str) -> Box<dyn Error> {
    format!(
        "No {} device with id '{}' in the device file\n\
         Use 'sbcio list --config <file>' to see configured devices",
        kind, id
    )
    .into()
}
