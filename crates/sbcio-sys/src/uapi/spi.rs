//! spidev ABI (`linux/spi/spidev.h`)

use crate::ioctl::{ior, iow};
use crate::kernel_struct;
use crate::marshal::{native_identity, StructKind};

const SPI_IOC_MAGIC: u8 = b'k';

kernel_struct! {
    /// `struct spi_ioc_transfer`
    ///
    /// `tx_buf`/`rx_buf` are user-space addresses; zero means "no buffer"
    /// (zeros are shifted out, or received data is discarded).
    pub struct SpiIocTransfer as "spi_ioc_transfer" {
        pub tx_buf: u64,
        pub rx_buf: u64,
        pub len: u32,
        pub speed_hz: u32,
        pub delay_usecs: u16,
        pub bits_per_word: u8,
        pub cs_change: u8,
        pub tx_nbits: u8,
        pub rx_nbits: u8,
        pub word_delay_usecs: u8,
        pub pad: u8,
    }
}

native_identity!(SpiIocTransfer, StructKind::SpiIocTransfer);

pub const SPI_IOC_RD_MODE: u32 = ior(SPI_IOC_MAGIC, 1, 1);
pub const SPI_IOC_WR_MODE: u32 = iow(SPI_IOC_MAGIC, 1, 1);
pub const SPI_IOC_RD_LSB_FIRST: u32 = ior(SPI_IOC_MAGIC, 2, 1);
pub const SPI_IOC_WR_LSB_FIRST: u32 = iow(SPI_IOC_MAGIC, 2, 1);
pub const SPI_IOC_RD_BITS_PER_WORD: u32 = ior(SPI_IOC_MAGIC, 3, 1);
pub const SPI_IOC_WR_BITS_PER_WORD: u32 = iow(SPI_IOC_MAGIC, 3, 1);
pub const SPI_IOC_RD_MAX_SPEED_HZ: u32 = ior(SPI_IOC_MAGIC, 4, 4);
pub const SPI_IOC_WR_MAX_SPEED_HZ: u32 = iow(SPI_IOC_MAGIC, 4, 4);

/// Most segments one `SPI_IOC_MESSAGE` can carry
pub const SPI_IOC_MESSAGE_MAX: usize = crate::ioctl::MAX_SIZE / SpiIocTransfer::LAYOUT.size;

/// `SPI_IOC_MESSAGE(n)`: submit `n` transfer segments under one chip select
pub const fn spi_ioc_message(n: usize) -> u32 {
    iow(SPI_IOC_MAGIC, 0, n * SpiIocTransfer::LAYOUT.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::serialize;

    #[test]
    fn test_transfer_layout() {
        let layout = &SpiIocTransfer::LAYOUT;
        assert_eq!(layout.size, 32);
        assert_eq!(layout.field("len").unwrap().offset, 16);
        assert_eq!(layout.field("speed_hz").unwrap().offset, 20);
        assert_eq!(layout.field("delay_usecs").unwrap().offset, 24);
        assert_eq!(layout.field("cs_change").unwrap().offset, 27);
        assert_eq!(layout.field("word_delay_usecs").unwrap().offset, 30);
    }

    #[test]
    fn test_ioctl_constants() {
        assert_eq!(SPI_IOC_RD_MODE, 0x8001_6B01);
        assert_eq!(SPI_IOC_WR_MODE, 0x4001_6B01);
        assert_eq!(SPI_IOC_RD_LSB_FIRST, 0x8001_6B02);
        assert_eq!(SPI_IOC_WR_LSB_FIRST, 0x4001_6B02);
        assert_eq!(SPI_IOC_RD_BITS_PER_WORD, 0x8001_6B03);
        assert_eq!(SPI_IOC_WR_BITS_PER_WORD, 0x4001_6B03);
        assert_eq!(SPI_IOC_RD_MAX_SPEED_HZ, 0x8004_6B04);
        assert_eq!(SPI_IOC_WR_MAX_SPEED_HZ, 0x4004_6B04);
        assert_eq!(spi_ioc_message(1), 0x4020_6B00);
        assert_eq!(spi_ioc_message(2), 0x4040_6B00);
        assert_eq!(SPI_IOC_MESSAGE_MAX, 511);
    }

    #[test]
    fn test_segment_bytes() {
        let segment = SpiIocTransfer {
            tx_buf: 0x1000,
            rx_buf: 0x2000,
            len: 4,
            speed_hz: 500_000,
            delay_usecs: 10,
            bits_per_word: 8,
            cs_change: 1,
            tx_nbits: 0,
            rx_nbits: 0,
            word_delay_usecs: 0,
            pad: 0,
        };
        let buf = serialize(&segment);
        assert_eq!(&buf[16..20], &4u32.to_ne_bytes());
        assert_eq!(&buf[20..24], &500_000u32.to_ne_bytes());
        assert_eq!(&buf[24..26], &10u16.to_ne_bytes());
        assert_eq!(buf[26], 8);
        assert_eq!(buf[27], 1);
    }
}
