//! GPIO chip character device
//!
//! A [`GpioChip`] is the `/dev/gpiochipN` handle used to discover lines and
//! to request line groups. The line group descriptor returned by
//! [`GpioChip::request_lines`] outlives the chip handle.

use crate::error::Result;

use sbcio_sys::ioctl::{ioctl_in_place, ioctl_out};
use sbcio_sys::uapi::gpio::{
    ChipInfo, LineInfo, LineRequest, GPIO_GET_CHIPINFO_IOCTL, GPIO_V2_GET_LINEINFO_IOCTL,
    GPIO_V2_GET_LINE_IOCTL,
};
use sbcio_sys::{FileDescriptor, SysError, Syscalls};

use nix::fcntl::OFlag;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An open GPIO chip
#[derive(Debug)]
pub struct GpioChip {
    path: PathBuf,
    fd: FileDescriptor,
}

impl GpioChip {
    /// Open a chip through the real kernel
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(sbcio_sys::system(), path)
    }

    pub fn open_with(sys: Arc<dyn Syscalls>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        log::debug!("gpio: Opening chip {}", path.display());
        let fd = FileDescriptor::open(sys, &path, OFlag::O_RDWR | OFlag::O_CLOEXEC)?;
        Ok(Self { path, fd })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name, label and line count
    pub fn info(&self) -> Result<ChipInfo> {
        // SAFETY: GPIO_GET_CHIPINFO fills a gpiochip_info
        let info = unsafe { ioctl_out::<ChipInfo>(&self.fd, GPIO_GET_CHIPINFO_IOCTL)? };
        Ok(info)
    }

    /// Current state of one line
    pub fn line_info(&self, offset: u32) -> Result<LineInfo> {
        // SAFETY: GPIO_V2_GET_LINEINFO reads the offset and fills the rest of
        // a gpio_v2_line_info
        let info = unsafe {
            ioctl_in_place(&self.fd, GPIO_V2_GET_LINEINFO_IOCTL, &LineInfo::query(offset))?
        };
        Ok(info)
    }

    /// Acquire every line of `request` in one call
    pub fn request_lines(&self, request: &LineRequest) -> Result<FileDescriptor> {
        // SAFETY: GPIO_V2_GET_LINE takes a gpio_v2_line_request and writes
        // the new descriptor into its fd field
        let granted = unsafe { ioctl_in_place(&self.fd, GPIO_V2_GET_LINE_IOCTL, request)? };
        if granted.fd < 0 {
            return Err(SysError::InvalidDescriptor.into());
        }
        log::debug!(
            "gpio: {} granted lines {:?} as fd {}",
            self.path.display(),
            request.offsets,
            granted.fd
        );
        Ok(FileDescriptor::from_raw(
            self.fd.syscalls().clone(),
            granted.fd,
        ))
    }

    pub fn close(&self) -> Result<()> {
        self.fd.close()?;
        Ok(())
    }
}
