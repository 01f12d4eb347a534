//! I2C commands

use crate::cli::I2cCommands;
use crate::commands::hex_string;
use crate::devices::Registry;

use sbcio_core::{Device, I2cDevice};
use std::error::Error;

pub fn run(command: I2cCommands, registry: &Registry) -> Result<(), Box<dyn Error>> {
    match command {
        I2cCommands::Read {
            device,
            address,
            length,
        } => {
            let i2c = registry.open_i2c(&device)?;
            let mut buf = vec![0u8; length];
            i2c.read(address, &mut buf)?;
            println!("{}", hex_string(&buf));
            i2c.close()?;
        }
        I2cCommands::Write {
            device,
            address,
            data,
        } => {
            let i2c = registry.open_i2c(&device)?;
            i2c.write(address, &data.0)?;
            log::info!("Wrote {} byte(s) to {:#04x}", data.0.len(), address);
            i2c.close()?;
        }
        I2cCommands::ReadReg {
            device,
            address,
            register,
            length,
        } => {
            let i2c = registry.open_i2c(&device)?;
            let mut buf = vec![0u8; length];
            i2c.read_register(address, register, &mut buf)?;
            println!("{}", hex_string(&buf));
            i2c.close()?;
        }
        I2cCommands::WriteReg {
            device,
            address,
            register,
            data,
        } => {
            let i2c = registry.open_i2c(&device)?;
            i2c.write_register(address, register, &data.0)?;
            log::info!(
                "Wrote {} byte(s) to {:#04x} register {:#04x}",
                data.0.len(),
                address,
                register
            );
            i2c.close()?;
        }
    }
    Ok(())
}
