//! GPIO line group provider and port
//!
//! [`LinuxGpioProvider`] turns a [`GpioPortConfig`] into a [`GpioLinePort`]:
//! it checks that no requested line is taken, requests all lines in one
//! `GPIO_V2_GET_LINE` call and keeps the returned line group descriptor.
//! Port values are bit-packed in request order.

use crate::chip::GpioChip;
use crate::debounce::{DebounceFilter, DebounceStrategy};
use crate::error::{LinuxGpioError, Result};
use crate::poller::EventPoller;

use sbcio_core::{
    Device, GpioEventMode, GpioListener, GpioPort, GpioPortConfig, GpioPortMode, ListenerId,
    Provider,
};
use sbcio_sys::ioctl::ioctl_in_place;
use sbcio_sys::uapi::gpio::{
    line_mask, LineAttribute, LineConfig, LineFlags, LineRequest, LineValues,
    GPIO_V2_LINES_MAX, GPIO_V2_LINE_GET_VALUES_IOCTL, GPIO_V2_LINE_SET_CONFIG_IOCTL,
    GPIO_V2_LINE_SET_VALUES_IOCTL,
};
use sbcio_sys::{FileDescriptor, Syscalls};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default GPIO chip
pub const DEFAULT_CHIP: &str = "/dev/gpiochip0";

/// How long the event thread blocks in `poll` before checking for stop
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Where and how edges are debounced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceMode {
    /// Leading-edge filter in the poller (works with every driver)
    #[default]
    Software,
    /// Deliver the last edge of a burst after the lines go quiet
    TrailingEdge,
    /// At most one edge per window
    Throttled,
    /// Deliver a settled edge only when it changes the line's level
    Stability,
    /// Ask the kernel for a debounce period on the lines
    Hardware,
}

impl DebounceMode {
    /// The poller filter for this mode, `None` for hardware debounce
    pub fn strategy(self) -> Option<DebounceStrategy> {
        match self {
            DebounceMode::Software => Some(DebounceStrategy::LeadingEdge),
            DebounceMode::TrailingEdge => Some(DebounceStrategy::TrailingEdge),
            DebounceMode::Throttled => Some(DebounceStrategy::Throttled),
            DebounceMode::Stability => Some(DebounceStrategy::Stability),
            DebounceMode::Hardware => None,
        }
    }
}

impl FromStr for DebounceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "software" | "sw" => Ok(DebounceMode::Software),
            "hardware" | "hw" => Ok(DebounceMode::Hardware),
            other => match other.parse::<DebounceStrategy>() {
                Ok(DebounceStrategy::LeadingEdge) => Ok(DebounceMode::Software),
                Ok(DebounceStrategy::TrailingEdge) => Ok(DebounceMode::TrailingEdge),
                Ok(DebounceStrategy::Throttled) => Ok(DebounceMode::Throttled),
                Ok(DebounceStrategy::Stability) => Ok(DebounceMode::Stability),
                Err(_) => Err(format!("Unknown debounce mode: {}", s)),
            },
        }
    }
}

/// Provider-wide settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioProviderOptions {
    pub debounce: DebounceMode,
    pub poll_timeout: Duration,
}

impl Default for GpioProviderOptions {
    fn default() -> Self {
        Self {
            debounce: DebounceMode::Software,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Creates ports on one GPIO chip
pub struct LinuxGpioProvider {
    chip: PathBuf,
    options: GpioProviderOptions,
    sys: Arc<dyn Syscalls>,
}

impl LinuxGpioProvider {
    pub fn new(chip: impl Into<PathBuf>) -> Self {
        Self {
            chip: chip.into(),
            options: GpioProviderOptions::default(),
            sys: sbcio_sys::system(),
        }
    }

    pub fn with_options(mut self, options: GpioProviderOptions) -> Self {
        self.options = options;
        self
    }

    /// Route kernel calls through `sys` instead of libc
    pub fn with_syscalls(mut self, sys: Arc<dyn Syscalls>) -> Self {
        self.sys = sys;
        self
    }

    pub fn chip(&self) -> &Path {
        &self.chip
    }

    /// Open the provider's chip for discovery
    pub fn open_chip(&self) -> Result<GpioChip> {
        GpioChip::open_with(self.sys.clone(), &self.chip)
    }
}

impl Default for LinuxGpioProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CHIP)
    }
}

fn validate(config: &GpioPortConfig) -> Result<()> {
    if config.pins.is_empty() {
        return Err(LinuxGpioError::InvalidParameter(format!(
            "port {} has no pins",
            config.id
        )));
    }
    if config.pins.len() > GPIO_V2_LINES_MAX {
        return Err(LinuxGpioError::InvalidParameter(format!(
            "port {} has {} pins (at most {})",
            config.id,
            config.pins.len(),
            GPIO_V2_LINES_MAX
        )));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = config.pins.iter().find(|p| !seen.insert(**p)) {
        return Err(LinuxGpioError::InvalidParameter(format!(
            "port {} lists pin {} twice",
            config.id, dup
        )));
    }
    Ok(())
}

fn mode_flags(mode: GpioPortMode) -> LineFlags {
    match mode {
        GpioPortMode::Input => LineFlags::INPUT,
        GpioPortMode::InputPullUp => LineFlags::INPUT | LineFlags::BIAS_PULL_UP,
        GpioPortMode::InputPullDown => LineFlags::INPUT | LineFlags::BIAS_PULL_DOWN,
        GpioPortMode::Output => LineFlags::OUTPUT,
        GpioPortMode::OutputOpenDrain => LineFlags::OUTPUT | LineFlags::OPEN_DRAIN,
        GpioPortMode::OutputOpenSource => LineFlags::OUTPUT | LineFlags::OPEN_SOURCE,
    }
}

/// Kernel line configuration for `config` with its lines in `mode`
pub fn line_config(
    config: &GpioPortConfig,
    mode: GpioPortMode,
    debounce: DebounceMode,
) -> Result<LineConfig> {
    let mut flags = mode_flags(mode);
    let edges = mode.is_input() && config.event_mode != GpioEventMode::None;
    if edges {
        if config.event_mode.rising() {
            flags |= LineFlags::EDGE_RISING;
        }
        if config.event_mode.falling() {
            flags |= LineFlags::EDGE_FALLING;
        }
    }

    let mask = line_mask(config.pins.len());
    let mut line_config = LineConfig::new(flags);
    if edges && debounce == DebounceMode::Hardware && config.debounce_micros > 0 {
        line_config.push_attribute(LineAttribute::Debounce(config.debounce_micros), mask)?;
    }
    if let (true, Some(value)) = (mode.is_output(), config.default_value) {
        line_config.push_attribute(LineAttribute::OutputValues(value), mask)?;
    }
    Ok(line_config)
}

impl Provider for LinuxGpioProvider {
    type Device = GpioLinePort;

    fn create(&self, config: &GpioPortConfig) -> Result<GpioLinePort> {
        validate(config)?;

        let chip = self.open_chip()?;
        for &offset in &config.pins {
            let info = chip.line_info(offset)?;
            if info.is_used() {
                log::debug!(
                    "gpio: Line {} on {} is held by {:?}",
                    offset,
                    self.chip.display(),
                    info.consumer
                );
                return Err(LinuxGpioError::LineInUse {
                    offset,
                    consumer: info.consumer.to_string(),
                });
            }
        }

        let line_config = line_config(config, config.mode, self.options.debounce)?;
        let request = LineRequest::new(&config.pins, &config.id, line_config)?;
        let fd = Arc::new(chip.request_lines(&request)?);
        drop(chip);

        let poller = config.edge_detection().then(|| {
            let filter = self
                .options
                .debounce
                .strategy()
                .filter(|_| config.debounce_micros > 0)
                .map(|strategy| DebounceFilter::from_micros(strategy, config.debounce_micros));
            EventPoller::new(config.id.clone(), fd.clone(), self.options.poll_timeout, filter)
        });

        let port = GpioLinePort {
            poller,
            config: config.clone(),
            chip: self.chip.clone(),
            debounce: self.options.debounce,
            mode: Mutex::new(config.mode),
            fd,
        };

        if let Some(value) = config.default_value {
            if config.mode.is_output() {
                port.write(value)?;
            } else {
                log::warn!(
                    "gpio: Ignoring default value for input port {}",
                    config.id
                );
            }
        }

        log::info!(
            "gpio: Opened port {} on {} (lines {:?}, {:?})",
            config.id,
            self.chip.display(),
            config.pins,
            config.mode
        );
        Ok(port)
    }
}

/// A group of lines held through one line group descriptor
pub struct GpioLinePort {
    // Declared first so the event thread stops before the descriptor goes
    poller: Option<EventPoller>,
    config: GpioPortConfig,
    chip: PathBuf,
    debounce: DebounceMode,
    mode: Mutex<GpioPortMode>,
    fd: Arc<FileDescriptor>,
}

impl GpioLinePort {
    fn mode_lock(&self) -> MutexGuard<'_, GpioPortMode> {
        self.mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mask(&self) -> u64 {
        line_mask(self.config.pins.len())
    }

    pub fn chip(&self) -> &Path {
        &self.chip
    }

    /// Current line mode; changes with [`set_mode`](Self::set_mode)
    pub fn mode(&self) -> GpioPortMode {
        *self.mode_lock()
    }

    /// Reconfigure the lines without releasing them
    pub fn set_mode(&self, mode: GpioPortMode) -> Result<()> {
        let mut current = self.mode_lock();
        let config = line_config(&self.config, mode, self.debounce)?;
        // SAFETY: GPIO_V2_LINE_SET_CONFIG takes a gpio_v2_line_config
        unsafe { ioctl_in_place(&self.fd, GPIO_V2_LINE_SET_CONFIG_IOCTL, &config)? };
        log::debug!("gpio: {}: mode {:?} -> {:?}", self.config.id, *current, mode);
        *current = mode;
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.poller.as_ref().is_some_and(EventPoller::is_running)
    }
}

impl Device for GpioLinePort {
    type Config = GpioPortConfig;
    type Error = LinuxGpioError;

    fn config(&self) -> &GpioPortConfig {
        &self.config
    }

    fn close(&self) -> Result<()> {
        if let Some(poller) = &self.poller {
            poller.stop();
        }
        if self.fd.is_open() {
            log::debug!("gpio: Closing port {}", self.config.id);
        }
        self.fd.close()?;
        Ok(())
    }
}

impl GpioPort for GpioLinePort {
    fn read(&self) -> Result<u64> {
        let query = LineValues {
            bits: 0,
            mask: u64::MAX,
        };
        // SAFETY: GPIO_V2_LINE_GET_VALUES takes a gpio_v2_line_values
        let values = unsafe { ioctl_in_place(&self.fd, GPIO_V2_LINE_GET_VALUES_IOCTL, &query)? };
        Ok(values.bits & self.mask())
    }

    fn write(&self, value: u64) -> Result<()> {
        let values = LineValues {
            bits: value,
            mask: u64::MAX,
        };
        // SAFETY: GPIO_V2_LINE_SET_VALUES takes a gpio_v2_line_values
        unsafe { ioctl_in_place(&self.fd, GPIO_V2_LINE_SET_VALUES_IOCTL, &values)? };
        log::trace!("gpio: {}: wrote {:#x}", self.config.id, value & self.mask());
        Ok(())
    }

    fn add_listener(&self, listener: GpioListener) -> Result<ListenerId> {
        self.fd.raw()?;
        let poller = self
            .poller
            .as_ref()
            .ok_or_else(|| LinuxGpioError::EdgeDetectionDisabled(self.config.id.clone()))?;
        poller.add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        Ok(self
            .poller
            .as_ref()
            .is_some_and(|poller| poller.remove_listener(id)))
    }
}

/// A port and the chip and debounce mode it should be created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioTarget {
    pub chip: PathBuf,
    pub debounce: DebounceMode,
    pub port: GpioPortConfig,
}

fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex {}: {}", s, e))
    } else if let Some(bin) = s.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).map_err(|e| format!("invalid binary {}: {}", s, e))
    } else {
        s.parse().map_err(|e| format!("invalid number {}: {}", s, e))
    }
}

fn parse_pins(value: &str) -> std::result::Result<Vec<u32>, String> {
    value
        .split(['+', ' ', ':'])
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid pin: {}", p))
        })
        .collect()
}

/// Parse port options from a list of key-value pairs
///
/// - `chip=/dev/gpiochip0` or `chip=0`
/// - `pins=17+27+22` (bit 0 is the first pin)
/// - `mode=input|pull-up|pull-down|output|open-drain|open-source`
/// - `edge=none|rising|falling|both`
/// - `debounce=5000` (microseconds)
/// - `debounce_mode=software|trailing|throttled|stability|hardware`
/// - `default=0x1`, `id=name`
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<GpioTarget, String> {
    let mut target = GpioTarget {
        chip: PathBuf::from(DEFAULT_CHIP),
        debounce: DebounceMode::default(),
        port: GpioPortConfig::default(),
    };

    for (key, value) in options {
        match *key {
            "chip" => {
                target.chip = match value.parse::<u32>() {
                    Ok(n) => PathBuf::from(format!("/dev/gpiochip{}", n)),
                    Err(_) => PathBuf::from(value),
                };
            }
            "pins" | "pin" => target.port.pins = parse_pins(value)?,
            "mode" => target.port.mode = value.parse()?,
            "edge" | "event_mode" => target.port.event_mode = value.parse()?,
            "debounce" => {
                target.port.debounce_micros = value
                    .parse()
                    .map_err(|_| format!("Invalid debounce value: {}", value))?;
            }
            "debounce_mode" => target.debounce = value.parse()?,
            "default" => target.port.default_value = Some(parse_number(value)?),
            "id" => target.port.id = value.to_string(),
            _ => {
                log::warn!("gpio: Unknown option: {}={}", key, value);
            }
        }
    }

    if target.port.pins.is_empty() {
        return Err("No pins specified. Use pins=N+M+...".to_string());
    }

    Ok(target)
}
