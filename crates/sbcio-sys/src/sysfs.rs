//! Text attribute access for sysfs directories

use crate::error::{Result, SysError};
use crate::fd::FileDescriptor;
use crate::native::Syscalls;

use nix::fcntl::OFlag;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Attribute values are single short lines
const MAX_ATTR_LEN: usize = 4096;

/// A sysfs directory whose attributes are read and written as text
#[derive(Clone)]
pub struct SysfsDir {
    path: PathBuf,
    sys: Arc<dyn Syscalls>,
}

impl SysfsDir {
    pub fn new(sys: Arc<dyn Syscalls>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sys,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.sys.exists(&self.path)
    }

    /// A subdirectory sharing the same syscalls
    pub fn join(&self, name: impl AsRef<Path>) -> SysfsDir {
        SysfsDir::new(self.sys.clone(), self.path.join(name))
    }

    /// Read an attribute, trimmed of trailing whitespace and non-printables
    pub fn read_string(&self, attr: &str) -> Result<String> {
        let fd = FileDescriptor::open(
            self.sys.clone(),
            self.path.join(attr),
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
        )?;
        let mut buf = vec![0u8; MAX_ATTR_LEN];
        let n = fd.read(&mut buf)?;
        fd.close()?;

        let value: String = String::from_utf8_lossy(&buf[..n])
            .chars()
            .take_while(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();
        Ok(value.trim_end().to_string())
    }

    /// Read a decimal (or `0x` hex) attribute
    pub fn read_u64(&self, attr: &str) -> Result<u64> {
        let value = self.read_string(attr)?;
        let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => value.parse::<u64>(),
        };
        parsed.map_err(|_| SysError::Parse {
            path: self.path.join(attr).display().to_string(),
            value,
        })
    }

    /// Write an attribute's text form
    pub fn write(&self, attr: &str, value: impl Display) -> Result<()> {
        let text = value.to_string();
        log::trace!("sysfs: {}/{} <- {}", self.path.display(), attr, text);
        let fd = FileDescriptor::open(
            self.sys.clone(),
            self.path.join(attr),
            OFlag::O_WRONLY | OFlag::O_CLOEXEC,
        )?;
        fd.write(text.as_bytes())?;
        fd.close()
    }
}

impl fmt::Debug for SysfsDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SysfsDir").field(&self.path).finish()
    }
}
