//! SPI device contract

use crate::config::SpiConfig;
use crate::device::Device;

/// One segment of a multi-segment SPI exchange
///
/// All segments of one [`SpiDevice::transfer_messages`] call run under a
/// single chip-select assertion unless a segment sets `cs_change`.
#[derive(Debug)]
pub struct SpiMessage<'a> {
    tx: Option<&'a [u8]>,
    rx: Option<&'a mut [u8]>,
    len: usize,
    /// Delay after this segment, in microseconds
    pub delay_us: u16,
    /// Deselect the device after this segment
    pub cs_change: bool,
    /// Clock override for this segment; 0 uses the device setting
    pub speed_hz: u32,
    /// Word size override; 0 uses the device setting
    pub bits_per_word: u8,
}

impl<'a> SpiMessage<'a> {
    fn new(tx: Option<&'a [u8]>, rx: Option<&'a mut [u8]>, len: usize) -> Self {
        Self {
            tx,
            rx,
            len,
            delay_us: 0,
            cs_change: false,
            speed_hz: 0,
            bits_per_word: 0,
        }
    }

    /// Shift out `data`, discarding what comes back
    pub fn write(data: &'a [u8]) -> Self {
        Self::new(Some(data), None, data.len())
    }

    /// Shift in `buf.len()` bytes while sending zeros
    pub fn read(buf: &'a mut [u8]) -> Self {
        let len = buf.len();
        Self::new(None, Some(buf), len)
    }

    /// Full duplex over the shorter of the two buffers
    pub fn transfer(tx: &'a [u8], rx: &'a mut [u8]) -> Self {
        let len = tx.len().min(rx.len());
        Self::new(Some(&tx[..len]), Some(&mut rx[..len]), len)
    }

    pub fn with_delay_us(mut self, delay_us: u16) -> Self {
        self.delay_us = delay_us;
        self
    }

    pub fn with_cs_change(mut self, cs_change: bool) -> Self {
        self.cs_change = cs_change;
        self
    }

    pub fn with_speed_hz(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    pub fn with_bits_per_word(mut self, bits: u8) -> Self {
        self.bits_per_word = bits;
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tx(&self) -> Option<&[u8]> {
        self.tx
    }

    pub fn rx_mut(&mut self) -> Option<&mut [u8]> {
        self.rx.as_deref_mut()
    }
}

/// An SPI peripheral behind one chip select
pub trait SpiDevice: Device<Config = SpiConfig> {
    /// Full-duplex exchange of `len` bytes
    ///
    /// Sends `write[write_offset..][..len]` while receiving into
    /// `read[read_offset..][..len]`. Returns the number of bytes exchanged.
    fn transfer(
        &self,
        write: &[u8],
        write_offset: usize,
        read: &mut [u8],
        read_offset: usize,
        len: usize,
    ) -> Result<usize, Self::Error>;

    /// Run several segments as one atomic exchange, returning the total length
    fn transfer_messages(&self, messages: &mut [SpiMessage<'_>]) -> Result<usize, Self::Error>;

    fn write(&self, data: &[u8]) -> Result<usize, Self::Error> {
        self.transfer_messages(&mut [SpiMessage::write(data)])
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.transfer_messages(&mut [SpiMessage::read(buf)])
    }

    /// Write a command, then read the response, without releasing chip select
    fn write_read(&self, write: &[u8], read: &mut [u8]) -> Result<usize, Self::Error> {
        self.transfer_messages(&mut [SpiMessage::write(write), SpiMessage::read(read)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lengths() {
        let tx = [1u8, 2, 3];
        let mut rx = [0u8; 2];
        let mut msg = SpiMessage::transfer(&tx, &mut rx).with_cs_change(true);
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.tx(), Some(&[1u8, 2][..]));
        assert_eq!(msg.rx_mut().map(|b| b.len()), Some(2));
        assert!(msg.cs_change);

        let mut buf = [0u8; 4];
        let msg = SpiMessage::read(&mut buf).with_delay_us(5);
        assert_eq!(msg.len(), 4);
        assert!(msg.tx().is_none());
        assert_eq!(msg.delay_us, 5);
    }
}
