//! GPIO commands

use crate::cli::GpioCommands;
use crate::devices::Registry;

use sbcio_core::{Device, GpioEvent, GpioPort};
use sbcio_linux_gpio::GpioChip;
use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn run(command: GpioCommands, registry: &Registry) -> Result<(), Box<dyn Error>> {
    match command {
        GpioCommands::Info { chip } => cmd_info(&chip),
        GpioCommands::Read { device } => cmd_read(registry, &device),
        GpioCommands::Write { device, value } => cmd_write(registry, &device, value),
        GpioCommands::Watch {
            device,
            count,
            timeout,
        } => cmd_watch(registry, &device, count, timeout.map(Duration::from_secs)),
    }
}

fn chip_path(chip: &str) -> PathBuf {
    match chip.parse::<u32>() {
        Ok(n) => PathBuf::from(format!("/dev/gpiochip{}", n)),
        Err(_) => PathBuf::from(chip),
    }
}

fn cmd_info(chip: &str) -> Result<(), Box<dyn Error>> {
    let chip = GpioChip::open(chip_path(chip))?;
    let info = chip.info()?;

    println!("{} [{}] ({} lines)", info.name, info.label, info.lines);
    println!();
    println!("{:>6}  {:<20} {:<20} Flags", "Line", "Name", "Consumer");
    println!("{}", "-".repeat(70));
    for offset in 0..info.lines {
        let line = chip.line_info(offset)?;
        let name = if line.name.is_empty() { "-" } else { line.name.as_str() };
        let consumer = if line.consumer.is_empty() {
            "-"
        } else {
            line.consumer.as_str()
        };
        println!(
            "{:>6}  {:<20} {:<20} {:?}",
            offset, name, consumer, line.flags
        );
    }

    chip.close()?;
    Ok(())
}

fn cmd_read(registry: &Registry, device: &str) -> Result<(), Box<dyn Error>> {
    let port = registry.open_gpio(device)?;
    let value = port.read()?;
    let pins = &port.config().pins;

    println!("{:#x}", value);
    for (bit, pin) in pins.iter().enumerate() {
        println!("  line {:>3}: {}", pin, (value >> bit) & 1);
    }

    port.close()?;
    Ok(())
}

fn cmd_write(registry: &Registry, device: &str, value: u64) -> Result<(), Box<dyn Error>> {
    let port = registry.open_gpio(device)?;
    port.write(value)?;
    log::info!("Wrote {:#x} to {:?}", value, port.config().pins);
    port.close()?;
    Ok(())
}

fn cmd_watch(
    registry: &Registry,
    device: &str,
    count: Option<usize>,
    timeout: Option<Duration>,
) -> Result<(), Box<dyn Error>> {
    let port = registry.open_gpio(device)?;
    let (tx, rx) = mpsc::channel::<GpioEvent>();
    let id = port.add_listener(Arc::new(move |event: &GpioEvent| {
        // The receiver only goes away once we stop watching
        let _ = tx.send(*event);
    }))?;

    println!(
        "Watching lines {:?} ({:?} edges)",
        port.config().pins,
        port.config().event_mode
    );

    let deadline = timeout.map(|t| Instant::now() + t);
    let mut seen = 0usize;
    while !matches!(count, Some(limit) if seen >= limit) {
        let event = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(left) {
                    Ok(event) => event,
                    Err(mpsc::RecvTimeoutError::Timeout) => break,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        seen += 1;
        println!(
            "{:>16}.{:09}  line {:>3}  {:<7}  seq {}/{}",
            event.timestamp_ns / 1_000_000_000,
            event.timestamp_ns % 1_000_000_000,
            event.offset,
            event.edge,
            event.seqno,
            event.line_seqno
        );
    }

    port.remove_listener(id)?;
    port.close()?;
    log::info!("{} event(s)", seen);
    Ok(())
}
