//! SPI commands

use crate::cli::SpiCommands;
use crate::commands::hex_string;
use crate::devices::Registry;

use sbcio_core::{Device, SpiDevice};
use std::error::Error;

pub fn run(command: SpiCommands, registry: &Registry) -> Result<(), Box<dyn Error>> {
    match command {
        SpiCommands::Transfer { device, data, read } => {
            cmd_transfer(registry, &device, &data.0, read)
        }
    }
}

fn cmd_transfer(
    registry: &Registry,
    device: &str,
    data: &[u8],
    read: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let spi = registry.open_spi(device)?;

    let received = match read {
        Some(len) => {
            let mut buf = vec![0u8; len];
            spi.write_read(data, &mut buf)?;
            buf
        }
        None => {
            let mut buf = vec![0u8; data.len()];
            spi.transfer(data, 0, &mut buf, 0, data.len())?;
            buf
        }
    };

    println!("{}", hex_string(&received));
    spi.close()?;
    Ok(())
}
