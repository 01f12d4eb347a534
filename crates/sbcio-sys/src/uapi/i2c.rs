//! i2c-dev ABI (`linux/i2c.h`, `linux/i2c-dev.h`)

use crate::ioctl::io;
use crate::kernel_struct;
use crate::marshal::{native_identity, StructKind};

const I2C_IOC_TYPE: u8 = 0x07;

/// Query adapter functionality (`unsigned long` result)
pub const I2C_FUNCS: u32 = io(I2C_IOC_TYPE, 0x05);
/// Combined read/write transfer
pub const I2C_RDWR: u32 = io(I2C_IOC_TYPE, 0x07);

/// Most messages one `I2C_RDWR` may carry
pub const I2C_RDWR_IOCTL_MAX_MSGS: usize = 42;

/// Message flag: read from the slave
pub const I2C_M_RD: u16 = 0x0001;

/// Adapter supports plain I2C message arrays
pub const I2C_FUNC_I2C: libc::c_ulong = 0x0000_0001;

kernel_struct! {
    /// `struct i2c_msg`
    pub struct I2cMsg as "i2c_msg" {
        pub addr: u16,
        pub flags: u16,
        pub len: u16,
        pub pad: u16,
        pub buf: usize,
    }
}

kernel_struct! {
    /// `struct i2c_rdwr_ioctl_data`
    pub struct I2cRdwrIoctlData as "i2c_rdwr_ioctl_data" {
        pub msgs: usize,
        pub nmsgs: u32,
        pub pad: [u8; std::mem::size_of::<usize>() - 4],
    }
}

native_identity!(I2cMsg, StructKind::I2cMsg);
native_identity!(I2cRdwrIoctlData, StructKind::I2cRdwrIoctlData);

impl I2cRdwrIoctlData {
    pub fn new(msgs: usize, nmsgs: u32) -> Self {
        Self {
            msgs,
            nmsgs,
            pad: [0; std::mem::size_of::<usize>() - 4],
        }
    }
}
