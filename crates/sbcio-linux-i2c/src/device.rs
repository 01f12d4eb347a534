//! Linux I2C adapter implementation
//!
//! [`LinuxI2cDevice`] drives an i2c-dev adapter with `I2C_RDWR`, so every
//! [`I2cDevice::transfer`] is one bus transaction with repeated starts
//! between its messages.

use crate::error::{LinuxI2cError, Result};

use sbcio_core::{Device, I2cConfig, I2cDevice, I2cMessage, Provider};
use sbcio_sys::ioctl::{ioctl_buffer, ioctl_value};
use sbcio_sys::marshal::{serialize, serialize_array};
use sbcio_sys::uapi::i2c::{
    I2cMsg, I2cRdwrIoctlData, I2C_FUNCS, I2C_FUNC_I2C, I2C_M_RD, I2C_RDWR,
    I2C_RDWR_IOCTL_MAX_MSGS,
};
use sbcio_sys::{FileDescriptor, Syscalls};

use nix::fcntl::OFlag;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory holding the i2c-dev character devices
pub const DEFAULT_DEV_ROOT: &str = "/dev";

/// Highest 7-bit slave address
const MAX_ADDRESS: u16 = 0x7f;

/// Opens `{dev_root}/i2c-{bus}`
pub struct LinuxI2cProvider {
    dev_root: PathBuf,
    sys: Arc<dyn Syscalls>,
}

impl Default for LinuxI2cProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxI2cProvider {
    pub fn new() -> Self {
        Self {
            dev_root: PathBuf::from(DEFAULT_DEV_ROOT),
            sys: sbcio_sys::system(),
        }
    }

    pub fn with_dev_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dev_root = root.into();
        self
    }

    /// Route kernel calls through `sys` instead of libc
    pub fn with_syscalls(mut self, sys: Arc<dyn Syscalls>) -> Self {
        self.sys = sys;
        self
    }

    pub fn device_path(&self, config: &I2cConfig) -> PathBuf {
        self.dev_root.join(format!("i2c-{}", config.bus))
    }
}

impl Provider for LinuxI2cProvider {
    type Device = LinuxI2cDevice;

    fn create(&self, config: &I2cConfig) -> Result<LinuxI2cDevice> {
        let path = self.device_path(config);
        log::debug!("i2c: Opening adapter {}", path.display());
        let fd = FileDescriptor::open(
            self.sys.clone(),
            &path,
            OFlag::O_RDWR | OFlag::O_CLOEXEC,
        )?;

        // SAFETY: I2C_FUNCS writes an unsigned long
        let funcs = unsafe { ioctl_value::<libc::c_ulong>(&fd, I2C_FUNCS, 0)? };
        if funcs & I2C_FUNC_I2C == 0 {
            if let Err(e) = fd.close() {
                log::warn!("i2c: Closing {} failed: {}", path.display(), e);
            }
            return Err(LinuxI2cError::MissingCapability {
                path: path.display().to_string(),
                funcs: funcs as u64,
            });
        }

        log::info!(
            "i2c: Opened {} (functionality {:#x})",
            path.display(),
            funcs
        );
        Ok(LinuxI2cDevice {
            config: config.clone(),
            path,
            fd,
            funcs: funcs as u64,
        })
    }
}

/// An open i2c-dev adapter
#[derive(Debug)]
pub struct LinuxI2cDevice {
    config: I2cConfig,
    path: PathBuf,
    fd: FileDescriptor,
    funcs: u64,
}

impl LinuxI2cDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `I2C_FUNC_*` bits reported by the adapter
    pub fn functionality(&self) -> u64 {
        self.funcs
    }
}

fn kernel_message(message: &mut I2cMessage<'_>) -> Result<I2cMsg> {
    let address = message.address();
    if address > MAX_ADDRESS {
        return Err(LinuxI2cError::InvalidParameter(format!(
            "address {:#x} is not a 7-bit address",
            address
        )));
    }
    let (flags, buf, len) = match message {
        I2cMessage::Read { buffer, .. } => (I2C_M_RD, buffer.as_mut_ptr() as usize, buffer.len()),
        I2cMessage::Write { data, .. } => (0, data.as_ptr() as usize, data.len()),
    };
    let len = u16::try_from(len).map_err(|_| {
        LinuxI2cError::InvalidParameter(format!("message of {} bytes is too long", len))
    })?;
    Ok(I2cMsg {
        addr: address,
        flags,
        len,
        pad: 0,
        buf,
    })
}

impl Device for LinuxI2cDevice {
    type Config = I2cConfig;
    type Error = LinuxI2cError;

    fn config(&self) -> &I2cConfig {
        &self.config
    }

    fn close(&self) -> Result<()> {
        self.fd.close()?;
        Ok(())
    }
}

impl I2cDevice for LinuxI2cDevice {
    fn transfer(&self, messages: &mut [I2cMessage<'_>]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if messages.len() > I2C_RDWR_IOCTL_MAX_MSGS {
            return Err(LinuxI2cError::InvalidParameter(format!(
                "{} messages (at most {})",
                messages.len(),
                I2C_RDWR_IOCTL_MAX_MSGS
            )));
        }

        let msgs = messages
            .iter_mut()
            .map(kernel_message)
            .collect::<Result<Vec<_>>>()?;
        let msg_bytes = serialize_array(&msgs);
        let data = I2cRdwrIoctlData::new(msg_bytes.as_ptr() as usize, msgs.len() as u32);
        let mut buf = serialize(&data);

        // SAFETY: `buf` is an i2c_rdwr_ioctl_data pointing at `msg_bytes`,
        // whose entries point into `messages`; all of them outlive the call
        unsafe { ioctl_buffer(&self.fd, I2C_RDWR, &mut buf)? };
        log::trace!(
            "i2c: {} message(s) on {}",
            msgs.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Parse adapter options from a list of key-value pairs
///
/// - `bus=1` or `dev=/dev/i2c-1`
/// - `id=name`
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<I2cConfig, String> {
    let mut config = I2cConfig::default();
    let mut named = false;

    for (key, value) in options {
        match *key {
            "bus" => {
                config.bus = value
                    .parse()
                    .map_err(|_| format!("Invalid bus value: {}", value))?;
            }
            "dev" => {
                config.bus = Path::new(value)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("i2c-"))
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| format!("Not an i2c-dev device: {}", value))?;
            }
            "id" => {
                config.id = value.to_string();
                named = true;
            }
            _ => {
                log::warn!("i2c: Unknown option: {}={}", key, value);
            }
        }
    }

    if !named {
        config.id = format!("i2c{}", config.bus);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbcio_core::{DeviceError, ErrorKind};
    use sbcio_sys::marshal::{deserialize, deserialize_list};
    use sbcio_sys::testing::FakeKernel;
    use std::sync::Mutex;

    const DEV: &str = "/dev/i2c-1";

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Seen {
        addr: u16,
        flags: u16,
        len: u16,
        data: Vec<u8>,
    }

    fn fake_adapter(kernel: &Arc<FakeKernel>, funcs: libc::c_ulong) {
        kernel.add_file(DEV, "");
        kernel.on_ioctl_sized(I2C_FUNCS, std::mem::size_of::<libc::c_ulong>(), move |_, buf| {
            buf.copy_from_slice(&funcs.to_ne_bytes());
            Ok(0)
        });
    }

    /// Record every message and fill read buffers with `0xC0 + index`
    fn record_transfers(kernel: &Arc<FakeKernel>) -> Arc<Mutex<Vec<Vec<Seen>>>> {
        let log: Arc<Mutex<Vec<Vec<Seen>>>> = Arc::default();
        let sink = log.clone();
        kernel.on_ioctl_sized(I2C_RDWR, I2cRdwrIoctlData::LAYOUT.size, move |_, buf| {
            let data: I2cRdwrIoctlData = deserialize(buf).unwrap();
            let count = data.nmsgs as usize;
            // SAFETY: the device keeps its message array alive for the ioctl
            let raw = unsafe {
                std::slice::from_raw_parts(data.msgs as *const u8, count * I2cMsg::LAYOUT.size)
            };
            let msgs: Vec<I2cMsg> = deserialize_list(raw, count).unwrap();

            let mut seen = Vec::new();
            for msg in msgs {
                // SAFETY: each buffer is borrowed by the caller for the ioctl
                let bytes = unsafe {
                    std::slice::from_raw_parts_mut(msg.buf as *mut u8, msg.len as usize)
                };
                if msg.flags & I2C_M_RD != 0 {
                    for (i, b) in bytes.iter_mut().enumerate() {
                        *b = 0xC0 + i as u8;
                    }
                }
                seen.push(Seen {
                    addr: msg.addr,
                    flags: msg.flags,
                    len: msg.len,
                    data: bytes.to_vec(),
                });
            }
            sink.lock().unwrap().push(seen);
            Ok(count as i32)
        });
        log
    }

    fn provider(kernel: &Arc<FakeKernel>) -> LinuxI2cProvider {
        LinuxI2cProvider::new().with_syscalls(kernel.clone())
    }

    #[test]
    fn test_missing_capability_closes_descriptor() {
        let kernel = FakeKernel::new();
        fake_adapter(&kernel, 0);

        let err = provider(&kernel).create(&I2cConfig::new(1)).unwrap_err();
        assert!(matches!(err, LinuxI2cError::MissingCapability { .. }));
        assert_eq!(err.kind(), ErrorKind::IllegalState);
        assert_eq!(kernel.open_count(), 0);
        assert!(kernel
            .calls()
            .iter()
            .any(|c| matches!(c, sbcio_sys::testing::Call::Close(_))));
    }

    #[test]
    fn test_close_failure_keeps_capability_error() {
        let kernel = FakeKernel::new();
        fake_adapter(&kernel, 0);
        kernel.fail_close(DEV, nix::errno::Errno::EIO);

        let err = provider(&kernel).create(&I2cConfig::new(1)).unwrap_err();
        assert!(matches!(err, LinuxI2cError::MissingCapability { funcs: 0, .. }));
        assert_eq!(kernel.open_count(), 0);
    }

    #[test]
    fn test_register_read_is_two_messages() {
        let kernel = FakeKernel::new();
        fake_adapter(&kernel, I2C_FUNC_I2C);
        let log = record_transfers(&kernel);
        let i2c = provider(&kernel).create(&I2cConfig::new(1)).unwrap();
        assert_eq!(i2c.functionality(), 1);

        let mut value = [0u8; 2];
        i2c.read_register(0x48, 0x05, &mut value).unwrap();
        assert_eq!(value, [0xC0, 0xC1]);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0],
            vec![
                Seen {
                    addr: 0x48,
                    flags: 0,
                    len: 1,
                    data: vec![0x05]
                },
                Seen {
                    addr: 0x48,
                    flags: I2C_M_RD,
                    len: 2,
                    data: vec![0xC0, 0xC1]
                },
            ]
        );
    }

    #[test]
    fn test_write_register_frames_payload() {
        let kernel = FakeKernel::new();
        fake_adapter(&kernel, I2C_FUNC_I2C);
        let log = record_transfers(&kernel);
        let i2c = provider(&kernel).create(&I2cConfig::new(1)).unwrap();

        i2c.write_register(0x20, 0x01, &[0xAA, 0xBB]).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log[0].len(), 1);
        assert_eq!(log[0][0].data, vec![0x01, 0xAA, 0xBB]);
    }

    #[test]
    fn test_message_limits() {
        let kernel = FakeKernel::new();
        fake_adapter(&kernel, I2C_FUNC_I2C);
        record_transfers(&kernel);
        let i2c = provider(&kernel).create(&I2cConfig::new(1)).unwrap();

        assert!(matches!(
            i2c.write(0x80, &[0]),
            Err(LinuxI2cError::InvalidParameter(_))
        ));

        let data = [0u8; 1];
        let mut messages: Vec<I2cMessage<'_>> =
            (0..43).map(|_| I2cMessage::write(0x10, &data)).collect();
        let err = i2c.transfer(&mut messages).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!kernel.ioctl_requests().contains(&I2C_RDWR));

        i2c.transfer(&mut []).unwrap();
    }

    #[test]
    fn test_missing_adapter() {
        let kernel = FakeKernel::new();
        let err = provider(&kernel).create(&I2cConfig::new(7)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapturedState);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/i2c-3")]).unwrap();
        assert_eq!(config.bus, 3);
        assert_eq!(config.id, "i2c3");

        let config = parse_options(&[("bus", "0"), ("id", "sensors")]).unwrap();
        assert_eq!(config.bus, 0);
        assert_eq!(config.id, "sensors");

        assert!(parse_options(&[("dev", "/dev/spidev0.0")]).is_err());
    }
}
