//! sbcio - Direct-to-kernel peripheral access for single-board computers
//!
//! Drives GPIO, SPI, I2C and PWM through the Linux user-space ABI:
//! - **GPIO** via `/dev/gpiochipN` (uAPI v2 line requests and edge events)
//! - **SPI** via `/dev/spidevB.C`
//! - **I2C** via `/dev/i2c-N`
//! - **PWM** via `/sys/class/pwm`
//!
//! Devices are given either as `key=value` options or as `@id` references
//! into a TOML device file passed with `--config`.

mod cli;
mod commands;
mod devices;

use clap::Parser;
use cli::{Cli, Commands};
use devices::Registry;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Kernel structure definitions must match the ABI before anything is sent
    if let Err(e) = sbcio_sys::marshal::validate_layouts() {
        eprintln!("Kernel structure layout mismatch: {}", e);
        std::process::exit(1);
    }

    let registry = match Registry::load(cli.config.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to load device file: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::List => {
            commands::list_devices(&registry);
            Ok(())
        }
        Commands::Gpio(command) => run_gpio(command, &registry),
        Commands::Spi(command) => run_spi(command, &registry),
        Commands::I2c(command) => run_i2c(command, &registry),
        Commands::Pwm(command) => run_pwm(command, &registry),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(feature = "gpio")]
fn run_gpio(command: cli::GpioCommands, registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    commands::gpio::run(command, registry)
}

#[cfg(not(feature = "gpio"))]
fn run_gpio(_: cli::GpioCommands, _: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    Err(devices::not_built("gpio"))
}

#[cfg(feature = "spi")]
fn run_spi(command: cli::SpiCommands, registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    commands::spi::run(command, registry)
}

#[cfg(not(feature = "spi"))]
fn run_spi(_: cli::SpiCommands, _: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    Err(devices::not_built("spi"))
}

#[cfg(feature = "i2c")]
fn run_i2c(command: cli::I2cCommands, registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    commands::i2c::run(command, registry)
}

#[cfg(not(feature = "i2c"))]
fn run_i2c(_: cli::I2cCommands, _: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    Err(devices::not_built("i2c"))
}

#[cfg(feature = "pwm")]
fn run_pwm(command: cli::PwmCommands, registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    commands::pwm::run(command, registry)
}

#[cfg(not(feature = "pwm"))]
fn run_pwm(_: cli::PwmCommands, _: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    Err(devices::not_built("pwm"))
}
