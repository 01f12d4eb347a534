//! Device configuration
//!
//! Every device is created from one of these plain configuration values.
//! All of them deserialize from TOML (see [`crate::devicefile`]) with missing
//! fields taking their defaults, and offer `with_*` builders for code.

use serde::Deserialize;
use std::str::FromStr;

/// Normalise a user-supplied enum name: lowercase, separators dropped
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Direction, bias and drive of a GPIO port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpioPortMode {
    #[default]
    Input,
    InputPullUp,
    InputPullDown,
    Output,
    OutputOpenDrain,
    OutputOpenSource,
}

impl GpioPortMode {
    pub fn is_input(self) -> bool {
        matches!(
            self,
            GpioPortMode::Input | GpioPortMode::InputPullUp | GpioPortMode::InputPullDown
        )
    }

    pub fn is_output(self) -> bool {
        !self.is_input()
    }
}

impl FromStr for GpioPortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "input" | "in" => Ok(GpioPortMode::Input),
            "inputpullup" | "pullup" => Ok(GpioPortMode::InputPullUp),
            "inputpulldown" | "pulldown" => Ok(GpioPortMode::InputPullDown),
            "output" | "out" => Ok(GpioPortMode::Output),
            "outputopendrain" | "opendrain" => Ok(GpioPortMode::OutputOpenDrain),
            "outputopensource" | "opensource" => Ok(GpioPortMode::OutputOpenSource),
            _ => Err(format!("Unknown GPIO mode: {}", s)),
        }
    }
}

/// Which edges of an input port raise events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpioEventMode {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl GpioEventMode {
    pub fn rising(self) -> bool {
        matches!(self, GpioEventMode::Rising | GpioEventMode::Both)
    }

    pub fn falling(self) -> bool {
        matches!(self, GpioEventMode::Falling | GpioEventMode::Both)
    }
}

impl FromStr for GpioEventMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" | "off" => Ok(GpioEventMode::None),
            "rising" => Ok(GpioEventMode::Rising),
            "falling" => Ok(GpioEventMode::Falling),
            "both" => Ok(GpioEventMode::Both),
            _ => Err(format!("Unknown edge mode: {}", s)),
        }
    }
}

/// A group of GPIO lines driven as one port
///
/// Bit *i* of a port value is `pins[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GpioPortConfig {
    pub id: String,
    /// Line offsets on the chip
    pub pins: Vec<u32>,
    pub mode: GpioPortMode,
    pub event_mode: GpioEventMode,
    /// Debounce window in microseconds
    pub debounce_micros: u32,
    /// Value written right after the lines are acquired
    pub default_value: Option<u64>,
}

impl Default for GpioPortConfig {
    fn default() -> Self {
        Self {
            id: "gpio".to_string(),
            pins: Vec::new(),
            mode: GpioPortMode::Input,
            event_mode: GpioEventMode::None,
            debounce_micros: 0,
            default_value: None,
        }
    }
}

impl GpioPortConfig {
    pub fn new(id: impl Into<String>, pins: &[u32]) -> Self {
        Self {
            id: id.into(),
            pins: pins.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: GpioPortMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_event_mode(mut self, event_mode: GpioEventMode) -> Self {
        self.event_mode = event_mode;
        self
    }

    pub fn with_debounce_micros(mut self, micros: u32) -> Self {
        self.debounce_micros = micros;
        self
    }

    pub fn with_default_value(mut self, value: u64) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Edge events are only reported for inputs
    pub fn edge_detection(&self) -> bool {
        self.mode.is_input() && self.event_mode != GpioEventMode::None
    }
}

/// Default SPI clock, 500 kHz
pub const DEFAULT_SPI_BAUD_RATE: u32 = 500_000;

/// An spidev device, `/dev/spidev{bus}.{chip_select}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    pub id: String,
    pub bus: u32,
    pub chip_select: u32,
    /// Maximum clock in Hz
    pub baud_rate: u32,
    /// SPI mode 0-3 (CPOL/CPHA)
    pub mode: u8,
    pub bits_per_word: u8,
    pub lsb_first: bool,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            id: "spi".to_string(),
            bus: 0,
            chip_select: 0,
            baud_rate: DEFAULT_SPI_BAUD_RATE,
            mode: 0,
            bits_per_word: 8,
            lsb_first: false,
        }
    }
}

impl SpiConfig {
    pub fn new(bus: u32, chip_select: u32) -> Self {
        Self {
            id: format!("spi{}.{}", bus, chip_select),
            bus,
            chip_select,
            ..Default::default()
        }
    }

    pub fn with_baud_rate(mut self, hz: u32) -> Self {
        self.baud_rate = hz;
        self
    }

    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }

    pub fn with_lsb_first(mut self, lsb_first: bool) -> Self {
        self.lsb_first = lsb_first;
        self
    }
}

/// An i2c-dev bus, `/dev/i2c-{bus}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct I2cConfig {
    pub id: String,
    pub bus: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            id: "i2c".to_string(),
            bus: 1,
        }
    }
}

impl I2cConfig {
    pub fn new(bus: u32) -> Self {
        Self {
            id: format!("i2c{}", bus),
            bus,
        }
    }
}

/// PWM output polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Normal,
    Inversed,
}

impl Polarity {
    /// Value of the sysfs `polarity` attribute
    pub fn as_str(self) -> &'static str {
        match self {
            Polarity::Normal => "normal",
            Polarity::Inversed => "inversed",
        }
    }
}

impl core::fmt::Display for Polarity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "normal" => Ok(Polarity::Normal),
            "inversed" | "inverted" => Ok(Polarity::Inversed),
            _ => Err(format!("Unknown polarity: {}", s)),
        }
    }
}

/// Default PWM frequency, 440 Hz
pub const DEFAULT_PWM_FREQUENCY: u32 = 440;

/// A sysfs PWM channel, `pwmchip{chip}/pwm{channel}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub id: String,
    pub chip: u32,
    pub channel: u32,
    /// Frequency in Hz
    pub frequency: u32,
    /// Duty cycle in percent, 0-100
    pub duty_cycle: u8,
    pub polarity: Polarity,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            id: "pwm".to_string(),
            chip: 0,
            channel: 0,
            frequency: DEFAULT_PWM_FREQUENCY,
            duty_cycle: 0,
            polarity: Polarity::Normal,
        }
    }
}

impl PwmConfig {
    pub fn new(chip: u32, channel: u32) -> Self {
        Self {
            id: format!("pwm{}.{}", chip, channel),
            chip,
            channel,
            ..Default::default()
        }
    }

    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.frequency = hz;
        self
    }

    pub fn with_duty_cycle(mut self, percent: u8) -> Self {
        self.duty_cycle = percent;
        self
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }
}
