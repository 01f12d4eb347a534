//! I2C bus contract

use crate::config::I2cConfig;
use crate::device::Device;

/// One addressed message of an I2C transfer
#[derive(Debug)]
pub enum I2cMessage<'a> {
    /// Read `buffer.len()` bytes from `address`
    Read { address: u16, buffer: &'a mut [u8] },
    /// Write `data` to `address`
    Write { address: u16, data: &'a [u8] },
}

impl<'a> I2cMessage<'a> {
    pub fn read(address: u16, buffer: &'a mut [u8]) -> Self {
        I2cMessage::Read { address, buffer }
    }

    pub fn write(address: u16, data: &'a [u8]) -> Self {
        I2cMessage::Write { address, data }
    }

    pub fn address(&self) -> u16 {
        match self {
            I2cMessage::Read { address, .. } | I2cMessage::Write { address, .. } => *address,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, I2cMessage::Read { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            I2cMessage::Read { buffer, .. } => buffer.len(),
            I2cMessage::Write { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An I2C adapter
pub trait I2cDevice: Device<Config = I2cConfig> {
    /// Run all messages as one transaction: a start condition per message and
    /// a single stop after the last
    fn transfer(&self, messages: &mut [I2cMessage<'_>]) -> Result<(), Self::Error>;

    fn write(&self, address: u16, data: &[u8]) -> Result<(), Self::Error> {
        self.transfer(&mut [I2cMessage::write(address, data)])
    }

    fn read(&self, address: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer(&mut [I2cMessage::read(address, buffer)])
    }

    /// Write then read with a repeated start
    fn write_read(&self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.transfer(&mut [
            I2cMessage::write(address, write),
            I2cMessage::read(address, read),
        ])
    }

    /// Read consecutive registers starting at `register`
    fn read_register(&self, address: u16, register: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.write_read(address, &[register], buffer)
    }

    /// Write consecutive registers starting at `register`
    fn write_register(&self, address: u16, register: u8, data: &[u8]) -> Result<(), Self::Error> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.write(address, &frame)
    }
}
