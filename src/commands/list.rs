//! List command implementation

use crate::devices::{available_kinds, Registry};

/// List supported device kinds and any devices from the device file
pub fn list_devices(registry: &Registry) {
    println!("Supported device kinds:");
    println!();
    for kind in available_kinds() {
        println!("  {:6} - {}", kind.name, kind.description);
        println!("           e.g. {}", kind.example);
    }

    let Some(file) = registry.file() else {
        return;
    };

    println!();
    println!("Configured devices:");
    println!();
    println!("{:<6} {:<16} {}", "Kind", "Id", "Location");
    println!("{}", "-".repeat(50));
    for entry in &file.gpio {
        println!(
            "{:<6} {:<16} {} pins {:?}",
            "gpio",
            entry.port.id,
            entry.chip.display(),
            entry.port.pins
        );
    }
    for spi in &file.spi {
        println!(
            "{:<6} {:<16} /dev/spidev{}.{} @ {} Hz",
            "spi", spi.id, spi.bus, spi.chip_select, spi.baud_rate
        );
    }
    for i2c in &file.i2c {
        println!("{:<6} {:<16} /dev/i2c-{}", "i2c", i2c.id, i2c.bus);
    }
    for pwm in &file.pwm {
        println!(
            "{:<6} {:<16} pwmchip{}/pwm{} @ {} Hz",
            "pwm", pwm.id, pwm.chip, pwm.channel, pwm.frequency
        );
    }
}
