//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u16
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u16(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range: {}", s))
}

/// Parse a string as a hex, binary or decimal u64
fn parse_value(s: &str) -> Result<u64, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2).map_err(|e| format!("Invalid binary value: {}", e))
    } else {
        s.parse::<u64>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Bytes given on the command line as hex
#[derive(Debug, Clone, Default)]
pub struct HexBytes(pub Vec<u8>);

/// Parse hex bytes, e.g. `9f000000` or `9f:00:00`
fn parse_hex_bytes(s: &str) -> Result<HexBytes, String> {
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    let digits = digits.strip_prefix("0x").unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits: {}", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| format!("Invalid hex byte: {}", &digits[i..i + 2]))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(HexBytes)
}

const DEVICE_HELP: &str = "Device: key=value options (e.g. bus=1) or @id from --config";

#[derive(Parser)]
#[command(name = "sbcio")]
#[command(
    author,
    version,
    about = "Direct-to-kernel GPIO, SPI, I2C and PWM access",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Device file (TOML) naming devices for @id references
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List supported device kinds and configured devices
    List,

    /// GPIO character device operations
    #[command(subcommand)]
    Gpio(GpioCommands),

    /// spidev operations
    #[command(subcommand)]
    Spi(SpiCommands),

    /// i2c-dev operations
    #[command(subcommand)]
    I2c(I2cCommands),

    /// sysfs PWM operations
    #[command(subcommand)]
    Pwm(PwmCommands),
}

#[derive(Subcommand)]
pub enum GpioCommands {
    /// Show chip information and every line
    Info {
        /// Chip number or path
        #[arg(default_value = "0")]
        chip: String,
    },

    /// Read a port value
    Read {
        #[arg(help = DEVICE_HELP)]
        device: String,
    },

    /// Write a port value (bit 0 is the first pin)
    Write {
        #[arg(help = DEVICE_HELP)]
        device: String,

        /// Value (hex, binary or decimal)
        #[arg(value_parser = parse_value)]
        value: u64,
    },

    /// Print edge events as they arrive
    Watch {
        #[arg(help = DEVICE_HELP)]
        device: String,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Stop after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum SpiCommands {
    /// Full-duplex transfer; prints the received bytes
    Transfer {
        #[arg(help = DEVICE_HELP)]
        device: String,

        /// Bytes to send (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,

        /// Read this many bytes after sending, in the same chip-select cycle
        #[arg(short, long)]
        read: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum I2cCommands {
    /// Read bytes from a slave
    Read {
        #[arg(help = DEVICE_HELP)]
        device: String,

        /// 7-bit slave address
        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        /// Number of bytes
        length: usize,
    },

    /// Write bytes to a slave
    Write {
        #[arg(help = DEVICE_HELP)]
        device: String,

        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        /// Bytes to send (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },

    /// Read a register (address write, repeated start, read)
    ReadReg {
        #[arg(help = DEVICE_HELP)]
        device: String,

        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        #[arg(value_parser = parse_hex_u8)]
        register: u8,

        /// Number of bytes
        #[arg(default_value = "1")]
        length: usize,
    },

    /// Write a register
    WriteReg {
        #[arg(help = DEVICE_HELP)]
        device: String,

        #[arg(value_parser = parse_hex_u16)]
        address: u16,

        #[arg(value_parser = parse_hex_u8)]
        register: u8,

        /// Bytes to send (hex)
        #[arg(value_parser = parse_hex_bytes)]
        data: HexBytes,
    },
}

#[derive(Subcommand)]
pub enum PwmCommands {
    /// Configure a channel and enable its output
    Set {
        #[arg(help = DEVICE_HELP)]
        device: String,

        /// Frequency in Hz
        #[arg(short, long)]
        frequency: Option<u32>,

        /// Duty cycle in percent
        #[arg(short, long)]
        duty: Option<u8>,

        /// normal or inversed
        #[arg(short, long)]
        polarity: Option<String>,
    },

    /// Disable a channel
    Off {
        #[arg(help = DEVICE_HELP)]
        device: String,
    },
}
