//! sbcio-sys - Kernel boundary for the sbcio device crates
//!
//! This crate holds everything that touches the Linux user-space ABI
//! directly:
//!
//! - [`marshal`]: byte-exact mapping between Rust values and C structures
//! - [`native`]: the [`Syscalls`] seam and errno capture
//! - [`fd`]: owned descriptors with idempotent close
//! - [`ioctl`]: request-word encoding and typed request helpers
//! - [`poll`]: readiness waits
//! - [`sysfs`]: text attribute access
//! - [`uapi`]: GPIO v2, spidev and i2c-dev structures and request numbers
//!
//! Device crates build on these pieces and never call `libc` themselves.
//!
//! # Testing
//!
//! With the `testing` feature, [`testing::FakeKernel`] provides an in-memory
//! [`Syscalls`] implementation for unit tests.

pub mod error;
pub mod fd;
pub mod ioctl;
pub mod marshal;
pub mod native;
pub mod poll;
pub mod sysfs;
pub mod uapi;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use error::{Result, SysError};
pub use fd::FileDescriptor;
pub use marshal::{Layout, NativeStruct, StructKind};
pub use native::{system, Libc, Syscalls};
pub use sysfs::SysfsDir;
