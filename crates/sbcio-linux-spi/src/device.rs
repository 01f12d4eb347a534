//! Linux SPI device implementation
//!
//! This module provides [`LinuxSpiDevice`], an [`SpiDevice`] over the
//! spidev character device, and the provider that opens and configures it.

use crate::error::{LinuxSpiError, Result};

use sbcio_core::{Device, Provider, SpiConfig, SpiDevice, SpiMessage};
use sbcio_sys::ioctl::{ioctl_buffer, ioctl_value};
use sbcio_sys::marshal::serialize_array;
use sbcio_sys::uapi::spi::{
    spi_ioc_message, SpiIocTransfer, SPI_IOC_MESSAGE_MAX, SPI_IOC_RD_BITS_PER_WORD,
    SPI_IOC_RD_LSB_FIRST, SPI_IOC_RD_MAX_SPEED_HZ, SPI_IOC_RD_MODE, SPI_IOC_WR_BITS_PER_WORD,
    SPI_IOC_WR_LSB_FIRST, SPI_IOC_WR_MAX_SPEED_HZ, SPI_IOC_WR_MODE,
};
use sbcio_sys::{FileDescriptor, SysError, SysfsDir, Syscalls};

use nix::fcntl::OFlag;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Directory holding the spidev character devices
pub const DEFAULT_DEV_ROOT: &str = "/dev";

/// spidev module parameters
const SPIDEV_PARAMETERS: &str = "/sys/module/spidev/parameters";

/// spidev's default `bufsiz`
const DEFAULT_BUF_SIZE: usize = 4096;

/// SPI mode constants
pub mod mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: u8 = 0;
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: u8 = 1;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: u8 = 2;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: u8 = 3;
}

/// Opens `{dev_root}/spidev{bus}.{chip_select}`
pub struct LinuxSpiProvider {
    dev_root: PathBuf,
    parameters: PathBuf,
    sys: Arc<dyn Syscalls>,
}

impl Default for LinuxSpiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxSpiProvider {
    pub fn new() -> Self {
        Self {
            dev_root: PathBuf::from(DEFAULT_DEV_ROOT),
            parameters: PathBuf::from(SPIDEV_PARAMETERS),
            sys: sbcio_sys::system(),
        }
    }

    pub fn with_dev_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dev_root = root.into();
        self
    }

    /// Where to look for the spidev `bufsiz` parameter
    pub fn with_parameters_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.parameters = dir.into();
        self
    }

    /// Route kernel calls through `sys` instead of libc
    pub fn with_syscalls(mut self, sys: Arc<dyn Syscalls>) -> Self {
        self.sys = sys;
        self
    }

    pub fn device_path(&self, config: &SpiConfig) -> PathBuf {
        self.dev_root
            .join(format!("spidev{}.{}", config.bus, config.chip_select))
    }

    /// Largest single ioctl payload the driver accepts
    fn max_transfer_len(&self) -> usize {
        let params = SysfsDir::new(self.sys.clone(), &self.parameters);
        match params.read_u64("bufsiz") {
            Ok(size) if size > 0 => {
                log::debug!("spi: Using buffer size {} from sysfs", size);
                usize::try_from(size).unwrap_or(usize::MAX)
            }
            Ok(_) => {
                log::warn!("spi: Invalid buffer size in {}", params.path().display());
                DEFAULT_BUF_SIZE
            }
            Err(e) => {
                log::debug!("spi: Cannot read bufsiz ({}), using {}", e, DEFAULT_BUF_SIZE);
                DEFAULT_BUF_SIZE
            }
        }
    }
}

fn validate(config: &SpiConfig) -> Result<()> {
    if config.mode > mode::MODE_3 {
        return Err(LinuxSpiError::InvalidParameter(format!(
            "SPI mode {} (must be 0-3)",
            config.mode
        )));
    }
    if config.bits_per_word == 0 {
        return Err(LinuxSpiError::InvalidParameter(
            "bits per word must be non-zero".into(),
        ));
    }
    if config.baud_rate == 0 {
        return Err(LinuxSpiError::InvalidParameter(
            "baud rate must be non-zero".into(),
        ));
    }
    Ok(())
}

/// Write a setting, then read it back
fn configure<V>(
    fd: &FileDescriptor,
    setting: &'static str,
    write: u32,
    read: u32,
    value: V,
) -> Result<()>
where
    V: FromBytes + IntoBytes + Immutable + Copy + PartialEq + Display,
{
    let wrap = |source: SysError| LinuxSpiError::Configure {
        setting,
        value: value.to_string(),
        source,
    };
    // SAFETY: the spidev setting requests take a pointer to a V-sized integer
    unsafe { ioctl_value(fd, write, value) }.map_err(wrap)?;
    // SAFETY: as above
    let actual = unsafe { ioctl_value(fd, read, value) }.map_err(wrap)?;
    if actual != value {
        log::warn!(
            "spi: Requested {} {} but device reports {}",
            setting,
            value,
            actual
        );
    }
    log::debug!("spi: Set {} to {}", setting, actual);
    Ok(())
}

impl Provider for LinuxSpiProvider {
    type Device = LinuxSpiDevice;

    fn create(&self, config: &SpiConfig) -> Result<LinuxSpiDevice> {
        validate(config)?;

        let path = self.device_path(config);
        log::debug!("spi: Opening device {}", path.display());
        let fd = FileDescriptor::open(
            self.sys.clone(),
            &path,
            OFlag::O_RDWR | OFlag::O_CLOEXEC,
        )?;

        configure(&fd, "mode", SPI_IOC_WR_MODE, SPI_IOC_RD_MODE, config.mode)?;
        configure(
            &fd,
            "bits per word",
            SPI_IOC_WR_BITS_PER_WORD,
            SPI_IOC_RD_BITS_PER_WORD,
            config.bits_per_word,
        )?;
        configure(
            &fd,
            "max speed",
            SPI_IOC_WR_MAX_SPEED_HZ,
            SPI_IOC_RD_MAX_SPEED_HZ,
            config.baud_rate,
        )?;
        configure(
            &fd,
            "lsb first",
            SPI_IOC_WR_LSB_FIRST,
            SPI_IOC_RD_LSB_FIRST,
            u8::from(config.lsb_first),
        )?;

        let max_transfer_len = self.max_transfer_len();
        log::info!(
            "spi: Opened {} (mode={}, speed={} kHz, {} bits)",
            path.display(),
            config.mode,
            config.baud_rate / 1000,
            config.bits_per_word
        );

        Ok(LinuxSpiDevice {
            config: config.clone(),
            path,
            fd,
            max_transfer_len,
        })
    }
}

/// An open spidev device
#[derive(Debug)]
pub struct LinuxSpiDevice {
    config: SpiConfig,
    path: PathBuf,
    fd: FileDescriptor,
    max_transfer_len: usize,
}

impl LinuxSpiDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes one transfer call may move
    pub fn max_transfer_len(&self) -> usize {
        self.max_transfer_len
    }

    fn segment(&self, tx: u64, rx: u64, len: usize) -> Result<SpiIocTransfer> {
        let len = u32::try_from(len).map_err(|_| {
            LinuxSpiError::InvalidParameter(format!("segment of {} bytes is too long", len))
        })?;
        Ok(SpiIocTransfer {
            tx_buf: tx,
            rx_buf: rx,
            len,
            speed_hz: self.config.baud_rate,
            delay_usecs: 0,
            bits_per_word: self.config.bits_per_word,
            cs_change: 0,
            tx_nbits: 0,
            rx_nbits: 0,
            word_delay_usecs: 0,
            pad: 0,
        })
    }

    /// Issue `SPI_IOC_MESSAGE(n)` for the given segments
    ///
    /// # Safety
    ///
    /// Every buffer address in `segments` must be valid for its length until
    /// this returns.
    unsafe fn submit(&self, segments: &[SpiIocTransfer]) -> Result<()> {
        if segments.len() > SPI_IOC_MESSAGE_MAX {
            return Err(LinuxSpiError::InvalidParameter(format!(
                "{} segments (at most {})",
                segments.len(),
                SPI_IOC_MESSAGE_MAX
            )));
        }
        // spidev bounds each direction by bufsiz separately
        let tx_total: usize = segments
            .iter()
            .filter(|s| s.tx_buf != 0)
            .map(|s| s.len as usize)
            .sum();
        let rx_total: usize = segments
            .iter()
            .filter(|s| s.rx_buf != 0)
            .map(|s| s.len as usize)
            .sum();
        for (direction, total) in [("tx", tx_total), ("rx", rx_total)] {
            if total > self.max_transfer_len {
                return Err(LinuxSpiError::InvalidParameter(format!(
                    "{} transfer of {} bytes exceeds the {} byte driver buffer",
                    direction, total, self.max_transfer_len
                )));
            }
        }
        let total = tx_total.max(rx_total);

        let mut buf = serialize_array(segments);
        // SAFETY: `buf` is an array of spi_ioc_transfer sized for the request;
        // the caller keeps the buffers it points at alive
        unsafe { ioctl_buffer(&self.fd, spi_ioc_message(segments.len()), &mut buf)? };
        log::trace!(
            "spi: {} segment(s), {} bytes on {}",
            segments.len(),
            total,
            self.path.display()
        );
        Ok(())
    }
}

fn check_range(what: &str, buf_len: usize, offset: usize, len: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= buf_len => Ok(()),
        _ => Err(LinuxSpiError::InvalidParameter(format!(
            "{} range {}+{} exceeds buffer of {} bytes",
            what, offset, len, buf_len
        ))),
    }
}

impl Device for LinuxSpiDevice {
    type Config = SpiConfig;
    type Error = LinuxSpiError;

    fn config(&self) -> &SpiConfig {
        &self.config
    }

    fn close(&self) -> Result<()> {
        self.fd.close()?;
        Ok(())
    }
}

impl SpiDevice for LinuxSpiDevice {
    fn transfer(
        &self,
        write: &[u8],
        write_offset: usize,
        read: &mut [u8],
        read_offset: usize,
        len: usize,
    ) -> Result<usize> {
        check_range("write", write.len(), write_offset, len)?;
        check_range("read", read.len(), read_offset, len)?;
        if len == 0 {
            return Ok(0);
        }

        let tx = &write[write_offset..write_offset + len];
        let rx = &mut read[read_offset..read_offset + len];
        let segment = self.segment(tx.as_ptr() as u64, rx.as_mut_ptr() as u64, len)?;
        // SAFETY: `tx` and `rx` are borrowed for the whole call and are `len` bytes
        unsafe { self.submit(&[segment])? };
        Ok(len)
    }

    fn transfer_messages(&self, messages: &mut [SpiMessage<'_>]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut segments = Vec::with_capacity(messages.len());
        let mut total = 0;
        for message in messages.iter_mut() {
            let len = message.len();
            let tx = message.tx().map_or(0, |b| b.as_ptr() as u64);
            let rx = message.rx_mut().map_or(0, |b| b.as_mut_ptr() as u64);
            let mut segment = self.segment(tx, rx, len)?;
            segment.delay_usecs = message.delay_us;
            segment.cs_change = u8::from(message.cs_change);
            if message.speed_hz != 0 {
                segment.speed_hz = message.speed_hz;
            }
            if message.bits_per_word != 0 {
                segment.bits_per_word = message.bits_per_word;
            }
            segments.push(segment);
            total += len;
        }

        // SAFETY: every segment points into a message buffer borrowed by
        // `messages` for the duration of this call
        unsafe { self.submit(&segments)? };
        Ok(total)
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("Invalid boolean: {}", value)),
    }
}

/// Parse device options from a list of key-value pairs
///
/// - `dev=/dev/spidev0.1`, or `bus=0` and `cs=1`
/// - `speed=1000000` (Hz) or `spispeed=1000` (kHz)
/// - `mode=0..3`, `bits=8`, `lsb_first=0|1`, `id=name`
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<SpiConfig, String> {
    let mut config = SpiConfig::default();
    let mut named = false;

    for (key, value) in options {
        match *key {
            "dev" => {
                let name = Path::new(value)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("spidev"))
                    .ok_or_else(|| format!("Not a spidev device: {}", value))?;
                let (bus, cs) = name
                    .split_once('.')
                    .ok_or_else(|| format!("Not a spidev device: {}", value))?;
                config.bus = bus.parse().map_err(|_| format!("Invalid bus in {}", value))?;
                config.chip_select = cs
                    .parse()
                    .map_err(|_| format!("Invalid chip select in {}", value))?;
            }
            "bus" => {
                config.bus = value
                    .parse()
                    .map_err(|_| format!("Invalid bus value: {}", value))?;
            }
            "cs" | "chip_select" => {
                config.chip_select = value
                    .parse()
                    .map_err(|_| format!("Invalid cs value: {}", value))?;
            }
            "speed" => {
                config.baud_rate = value
                    .parse()
                    .map_err(|_| format!("Invalid speed value: {}", value))?;
            }
            "spispeed" => {
                // Parse speed in kHz
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                config.baud_rate = speed_khz
                    .checked_mul(1000)
                    .ok_or_else(|| format!("Invalid spispeed value: {} (too fast)", value))?;
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                if mode > mode::MODE_3 {
                    return Err(format!("Invalid SPI mode: {} (must be 0-3)", mode));
                }
                config.mode = mode;
            }
            "bits" => {
                config.bits_per_word = value
                    .parse()
                    .map_err(|_| format!("Invalid bits value: {}", value))?;
            }
            "lsb_first" => config.lsb_first = parse_bool(value)?,
            "id" => {
                config.id = value.to_string();
                named = true;
            }
            _ => {
                log::warn!("spi: Unknown option: {}={}", key, value);
            }
        }
    }

    if !named {
        config.id = format!("spi{}.{}", config.bus, config.chip_select);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbcio_core::{DeviceError, ErrorKind};
    use sbcio_sys::marshal::deserialize_list;
    use sbcio_sys::testing::FakeKernel;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const DEV: &str = "/dev/spidev0.1";

    type Settings = Arc<Mutex<HashMap<u8, Vec<u8>>>>;
    type Segments = Arc<Mutex<Vec<SpiIocTransfer>>>;

    /// A spidev that remembers settings and answers every transfer with
    /// `reply` bytes, recording the segments it saw
    fn fake_spidev(kernel: &Arc<FakeKernel>, reply: u8, segments: usize) -> (Settings, Segments) {
        kernel.add_file(DEV, "");
        let settings: Settings = Arc::default();
        for (write, read) in [
            (SPI_IOC_WR_MODE, SPI_IOC_RD_MODE),
            (SPI_IOC_WR_BITS_PER_WORD, SPI_IOC_RD_BITS_PER_WORD),
            (SPI_IOC_WR_MAX_SPEED_HZ, SPI_IOC_RD_MAX_SPEED_HZ),
            (SPI_IOC_WR_LSB_FIRST, SPI_IOC_RD_LSB_FIRST),
        ] {
            let nr = (write & 0xff) as u8;
            let store = settings.clone();
            kernel.on_ioctl(write, move |_, buf| {
                store.lock().unwrap().insert(nr, buf.to_vec());
                Ok(0)
            });
            let store = settings.clone();
            kernel.on_ioctl(read, move |_, buf| {
                if let Some(value) = store.lock().unwrap().get(&nr) {
                    buf.copy_from_slice(value);
                }
                Ok(0)
            });
        }

        let seen: Segments = Arc::default();
        let log = seen.clone();
        kernel.on_ioctl(spi_ioc_message(segments), move |_, buf| {
            let list: Vec<SpiIocTransfer> = deserialize_list(buf, segments).unwrap();
            for segment in &list {
                if segment.rx_buf != 0 {
                    // SAFETY: the device keeps rx buffers alive for the ioctl
                    let rx = unsafe {
                        std::slice::from_raw_parts_mut(
                            segment.rx_buf as *mut u8,
                            segment.len as usize,
                        )
                    };
                    rx.fill(reply);
                }
            }
            log.lock().unwrap().extend(list);
            Ok(0)
        });
        (settings, seen)
    }

    fn provider(kernel: &Arc<FakeKernel>) -> LinuxSpiProvider {
        LinuxSpiProvider::new()
            .with_syscalls(kernel.clone())
            .with_parameters_dir("/sys/module/spidev/parameters")
    }

    #[test]
    fn test_create_configures_device() {
        let kernel = FakeKernel::new();
        let (settings, _) = fake_spidev(&kernel, 0, 1);
        let config = SpiConfig::new(0, 1)
            .with_mode(3)
            .with_baud_rate(1_000_000)
            .with_lsb_first(true);
        let spi = provider(&kernel).create(&config).unwrap();
        assert_eq!(spi.path(), Path::new(DEV));
        assert_eq!(spi.max_transfer_len(), DEFAULT_BUF_SIZE);

        let requests = kernel.ioctl_requests();
        assert_eq!(
            requests,
            vec![
                SPI_IOC_WR_MODE,
                SPI_IOC_RD_MODE,
                SPI_IOC_WR_BITS_PER_WORD,
                SPI_IOC_RD_BITS_PER_WORD,
                SPI_IOC_WR_MAX_SPEED_HZ,
                SPI_IOC_RD_MAX_SPEED_HZ,
                SPI_IOC_WR_LSB_FIRST,
                SPI_IOC_RD_LSB_FIRST,
            ]
        );
        let settings = settings.lock().unwrap();
        assert_eq!(settings[&1], vec![3]);
        assert_eq!(settings[&3], vec![8]);
        assert_eq!(settings[&4], 1_000_000u32.to_ne_bytes().to_vec());
        assert_eq!(settings[&2], vec![1]);
    }

    #[test]
    fn test_transfer_returns_length() {
        let kernel = FakeKernel::new();
        let (_, segments) = fake_spidev(&kernel, 0xA5, 1);
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();

        let write = [0x9F, 0, 0, 0];
        let mut read = [0u8; 6];
        assert_eq!(spi.transfer(&write, 0, &mut read, 2, 4).unwrap(), 4);
        assert_eq!(read, [0, 0, 0xA5, 0xA5, 0xA5, 0xA5]);

        let seen = segments.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len, 4);
        assert_eq!(seen[0].speed_hz, 500_000);
        assert_eq!(seen[0].bits_per_word, 8);
    }

    #[test]
    fn test_transfer_bounds() {
        let kernel = FakeKernel::new();
        fake_spidev(&kernel, 0, 1);
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();

        let mut read = [0u8; 4];
        let err = spi.transfer(&[1, 2], 1, &mut read, 0, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(spi.transfer(&[], 0, &mut [], 0, 0).unwrap(), 0);
        assert!(!kernel
            .ioctl_requests()
            .contains(&spi_ioc_message(1)));
    }

    #[test]
    fn test_write_read_is_one_message() {
        let kernel = FakeKernel::new();
        let (_, segments) = fake_spidev(&kernel, 0x42, 2);
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();

        let mut id = [0u8; 3];
        assert_eq!(spi.write_read(&[0x9F], &mut id).unwrap(), 4);
        assert_eq!(id, [0x42; 3]);

        let seen = segments.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].tx_buf, 0);
        assert_eq!(seen[0].rx_buf, 0);
        assert_eq!(seen[1].tx_buf, 0);
        assert_eq!(seen[1].len, 3);
    }

    #[test]
    fn test_segment_overrides() {
        let kernel = FakeKernel::new();
        let (_, segments) = fake_spidev(&kernel, 0, 2);
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();

        let mut rx = [0u8; 2];
        let total = spi
            .transfer_messages(&mut [
                SpiMessage::write(&[0x02, 0x10])
                    .with_delay_us(10)
                    .with_cs_change(true),
                SpiMessage::read(&mut rx)
                    .with_speed_hz(2_000_000)
                    .with_bits_per_word(16),
            ])
            .unwrap();
        assert_eq!(total, 4);

        let seen = segments.lock().unwrap();
        assert_eq!(seen[0].delay_usecs, 10);
        assert_eq!(seen[0].cs_change, 1);
        assert_eq!(seen[0].speed_hz, 500_000);
        assert_eq!(seen[1].cs_change, 0);
        assert_eq!(seen[1].speed_hz, 2_000_000);
        assert_eq!(seen[1].bits_per_word, 16);
    }

    #[test]
    fn test_bufsiz_limit() {
        let kernel = FakeKernel::new();
        fake_spidev(&kernel, 0, 1);
        kernel.add_file("/sys/module/spidev/parameters/bufsiz", "8\n");
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();
        assert_eq!(spi.max_transfer_len(), 8);

        let mut read = [0u8; 16];
        assert!(matches!(
            spi.transfer(&[0u8; 16], 0, &mut read, 0, 16),
            Err(LinuxSpiError::InvalidParameter(_))
        ));
        assert_eq!(spi.transfer(&[0u8; 16], 0, &mut read, 0, 8).unwrap(), 8);
    }

    #[test]
    fn test_bufsiz_counts_each_direction() {
        let kernel = FakeKernel::new();
        let (_, segments) = fake_spidev(&kernel, 0x5A, 2);
        kernel.add_file("/sys/module/spidev/parameters/bufsiz", "8\n");
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();

        let mut rx = [0u8; 6];
        assert_eq!(spi.write_read(&[1u8; 6], &mut rx).unwrap(), 12);
        assert_eq!(rx, [0x5A; 6]);
        assert_eq!(segments.lock().unwrap().len(), 2);

        let mut rx = [0u8; 9];
        let err = spi.write_read(&[1u8; 2], &mut rx).unwrap_err();
        assert!(err.to_string().contains("rx transfer of 9 bytes"));
    }

    #[test]
    fn test_refused_setting() {
        let kernel = FakeKernel::new();
        kernel.add_file(DEV, "");
        kernel.on_ioctl(SPI_IOC_WR_MODE, |_, _| Err(nix::errno::Errno::EINVAL));

        let err = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap_err();
        assert!(matches!(err, LinuxSpiError::Configure { setting: "mode", .. }));
        assert_eq!(err.kind(), ErrorKind::CapturedState);
        assert_eq!(kernel.open_count(), 0);
    }

    #[test]
    fn test_missing_device() {
        let kernel = FakeKernel::new();
        let err = provider(&kernel).create(&SpiConfig::new(3, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapturedState);
        assert!(matches!(
            provider(&kernel).create(&SpiConfig::new(0, 0).with_mode(4)),
            Err(LinuxSpiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_closed_device() {
        let kernel = FakeKernel::new();
        fake_spidev(&kernel, 0, 1);
        let spi = provider(&kernel).create(&SpiConfig::new(0, 1)).unwrap();
        spi.close().unwrap();
        let err = spi.write(&[1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDescriptor);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/spidev1.2"), ("spispeed", "4000")]).unwrap();
        assert_eq!(config.bus, 1);
        assert_eq!(config.chip_select, 2);
        assert_eq!(config.baud_rate, 4_000_000);
        assert_eq!(config.id, "spi1.2");

        let config = parse_options(&[
            ("bus", "0"),
            ("cs", "1"),
            ("mode", "3"),
            ("lsb_first", "1"),
            ("id", "flash"),
        ])
        .unwrap();
        assert_eq!(config.mode, 3);
        assert!(config.lsb_first);
        assert_eq!(config.id, "flash");

        assert!(parse_options(&[("mode", "4")]).is_err());
        assert!(parse_options(&[("dev", "/dev/ttyS0")]).is_err());
    }

    #[test]
    fn test_spispeed_overflow() {
        let config = parse_options(&[("spispeed", "4294967")]).unwrap();
        assert_eq!(config.baud_rate, 4_294_967_000);
        let err = parse_options(&[("spispeed", "5000000")]).unwrap_err();
        assert!(err.contains("spispeed"));
    }
}
