//! sysfs PWM channel implementation

use crate::error::{LinuxPwmError, Result};

use sbcio_core::{Device, Polarity, Provider, PwmChannel, PwmConfig};
use sbcio_sys::{SysfsDir, Syscalls};

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Where the kernel publishes PWM chips
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/pwm";

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Provider tuning
#[derive(Debug, Clone)]
pub struct PwmProviderOptions {
    pub sysfs_root: PathBuf,
    /// Times to look for the channel directory after exporting
    pub export_attempts: u32,
    pub export_backoff: Duration,
}

impl Default for PwmProviderOptions {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            export_attempts: 1000,
            export_backoff: Duration::from_millis(1),
        }
    }
}

/// Exports and configures channels under `{sysfs_root}/pwmchipN`
pub struct LinuxPwmProvider {
    options: PwmProviderOptions,
    sys: Arc<dyn Syscalls>,
}

impl Default for LinuxPwmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPwmProvider {
    pub fn new() -> Self {
        Self {
            options: PwmProviderOptions::default(),
            sys: sbcio_sys::system(),
        }
    }

    pub fn with_options(mut self, options: PwmProviderOptions) -> Self {
        self.options = options;
        self
    }

    /// Route kernel calls through `sys` instead of libc
    pub fn with_syscalls(mut self, sys: Arc<dyn Syscalls>) -> Self {
        self.sys = sys;
        self
    }

    fn chip_dir(&self, chip: u32) -> SysfsDir {
        SysfsDir::new(
            self.sys.clone(),
            self.options.sysfs_root.join(format!("pwmchip{}", chip)),
        )
    }

    /// Export `channel` and wait for its directory
    fn export(&self, chip: &SysfsDir, channel: u32, dir: &SysfsDir) -> Result<()> {
        let npwm = chip.read_u64("npwm")?;
        if u64::from(channel) >= npwm {
            return Err(LinuxPwmError::ChannelOutOfRange { channel, npwm });
        }

        log::debug!("pwm: Exporting {}", dir.path().display());
        chip.write("export", channel)?;

        for attempt in 0..self.options.export_attempts {
            if dir.exists() {
                log::trace!("pwm: {} ready after {} attempt(s)", dir.path().display(), attempt + 1);
                return Ok(());
            }
            thread::sleep(self.options.export_backoff);
        }
        Err(LinuxPwmError::ExportTimeout {
            path: dir.path().display().to_string(),
            attempts: self.options.export_attempts,
        })
    }
}

fn validate(frequency: u32, duty_cycle: u8) -> Result<()> {
    if frequency == 0 {
        return Err(LinuxPwmError::InvalidParameter(
            "frequency must be greater than 0".to_string(),
        ));
    }
    if duty_cycle > 100 {
        return Err(LinuxPwmError::InvalidParameter(format!(
            "duty cycle {}% exceeds 100%",
            duty_cycle
        )));
    }
    Ok(())
}

impl Provider for LinuxPwmProvider {
    type Device = LinuxPwmChannel;

    fn create(&self, config: &PwmConfig) -> Result<LinuxPwmChannel> {
        validate(config.frequency, config.duty_cycle)?;

        let chip = self.chip_dir(config.chip);
        if !chip.exists() {
            return Err(LinuxPwmError::ChipNotFound(chip.path().display().to_string()));
        }
        let dir = chip.join(format!("pwm{}", config.channel));

        let exported = !dir.exists();
        if exported {
            self.export(&chip, config.channel, &dir)?;
        } else {
            // Left over from an earlier user; never reconfigure it live
            dir.write("enable", 0)?;
        }

        let channel = LinuxPwmChannel {
            config: config.clone(),
            chip,
            dir,
            state: Mutex::new(ChannelState {
                settings: Settings::from(config),
                exported,
            }),
        };
        let settings = channel.lock().settings;
        if let Err(e) = channel.apply(&settings) {
            if let Err(cleanup) = channel.close() {
                log::warn!("pwm: Cleanup after failed setup: {}", cleanup);
            }
            return Err(e);
        }

        log::info!(
            "pwm: Opened {} ({} Hz, {}%, {})",
            channel.dir.path().display(),
            config.frequency,
            config.duty_cycle,
            config.polarity.as_str()
        );
        Ok(channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    frequency: u32,
    duty_cycle: u8,
    polarity: Polarity,
}

impl From<&PwmConfig> for Settings {
    fn from(config: &PwmConfig) -> Self {
        Self {
            frequency: config.frequency,
            duty_cycle: config.duty_cycle,
            polarity: config.polarity,
        }
    }
}

impl Settings {
    fn period_ns(&self) -> u64 {
        NANOS_PER_SEC / u64::from(self.frequency)
    }

    fn duty_ns(&self) -> u64 {
        self.period_ns() * u64::from(self.duty_cycle) / 100
    }
}

#[derive(Debug)]
struct ChannelState {
    settings: Settings,
    /// Whether this channel was exported by us and must be unexported
    exported: bool,
}

/// An exported sysfs PWM channel
///
/// All setters hold one lock, so a reconfiguration is never interleaved
/// with another on the same channel.
#[derive(Debug)]
pub struct LinuxPwmChannel {
    config: PwmConfig,
    chip: SysfsDir,
    dir: SysfsDir,
    state: Mutex<ChannelState>,
}

impl LinuxPwmChannel {
    pub fn sysfs_dir(&self) -> &SysfsDir {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_enabled(&self) -> Result<bool> {
        Ok(self.dir.read_u64("enable")? != 0)
    }

    /// Write `settings` in an order every driver accepts
    ///
    /// The output is disabled around the update and the duty cycle parked
    /// at zero, so the duty cycle never exceeds the period in between.
    /// Write `settings`, pausing the output if it is running
    ///
    /// A running channel is re-enabled even when a write fails part way.
    fn apply(&self, settings: &Settings) -> Result<()> {
        let was_enabled = self.read_enabled()?;
        if was_enabled {
            self.dir.write("enable", 0)?;
        }
        let written = self.write_settings(settings);
        if was_enabled {
            match (&written, self.dir.write("enable", 1)) {
                (_, Ok(())) => {}
                (Ok(()), Err(e)) => return Err(e.into()),
                (Err(_), Err(e)) => {
                    log::warn!("pwm: {}: re-enabling after failed update: {}", self.config.id, e);
                }
            }
        }
        written
    }

    fn write_settings(&self, settings: &Settings) -> Result<()> {
        self.dir.write("duty_cycle", 0)?;
        self.dir.write("period", settings.period_ns())?;
        self.dir.write("duty_cycle", settings.duty_ns())?;
        self.dir.write("polarity", settings.polarity.as_str())?;
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut state = self.lock();
        let mut settings = state.settings;
        change(&mut settings);
        validate(settings.frequency, settings.duty_cycle)?;
        self.apply(&settings)?;
        state.settings = settings;
        Ok(())
    }
}

impl Device for LinuxPwmChannel {
    type Config = PwmConfig;
    type Error = LinuxPwmError;

    fn config(&self) -> &PwmConfig {
        &self.config
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if self.dir.exists() {
            self.dir.write("enable", 0)?;
        }
        if state.exported {
            self.chip.write("unexport", self.config.channel)?;
            state.exported = false;
            log::debug!("pwm: Unexported {}", self.dir.path().display());
        }
        Ok(())
    }
}

impl PwmChannel for LinuxPwmChannel {
    fn set_frequency(&self, hz: u32) -> Result<()> {
        self.update(|s| s.frequency = hz)
    }

    fn set_duty_cycle(&self, percent: u8) -> Result<()> {
        self.update(|s| s.duty_cycle = percent)
    }

    fn set_polarity(&self, polarity: Polarity) -> Result<()> {
        self.update(|s| s.polarity = polarity)
    }

    fn on(&self) -> Result<()> {
        let state = self.lock();
        self.apply(&state.settings)?;
        self.dir.write("enable", 1)?;
        Ok(())
    }

    fn off(&self) -> Result<()> {
        let _state = self.lock();
        self.dir.write("enable", 0)?;
        Ok(())
    }

    fn is_enabled(&self) -> Result<bool> {
        self.read_enabled()
    }
}

/// Parse channel options from a list of key-value pairs
///
/// - `chip=0`, `channel=1`
/// - `frequency=440` (or `freq`), `duty=50` (or `duty_cycle`)
/// - `polarity=normal|inversed`
/// - `id=name`
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<PwmConfig, String> {
    let mut config = PwmConfig::default();
    let mut named = false;

    for (key, value) in options {
        match *key {
            "chip" => {
                config.chip = value
                    .parse()
                    .map_err(|_| format!("Invalid chip value: {}", value))?;
            }
            "channel" => {
                config.channel = value
                    .parse()
                    .map_err(|_| format!("Invalid channel value: {}", value))?;
            }
            "frequency" | "freq" => {
                config.frequency = value
                    .parse()
                    .map_err(|_| format!("Invalid frequency value: {}", value))?;
            }
            "duty" | "duty_cycle" => {
                config.duty_cycle = value
                    .trim_end_matches('%')
                    .parse()
                    .map_err(|_| format!("Invalid duty cycle value: {}", value))?;
            }
            "polarity" => {
                config.polarity = value.parse()?;
            }
            "id" => {
                config.id = value.to_string();
                named = true;
            }
            _ => {
                log::warn!("pwm: Unknown option: {}={}", key, value);
            }
        }
    }

    if !named {
        config.id = format!("pwm{}.{}", config.chip, config.channel);
    }
    Ok(config)
}
