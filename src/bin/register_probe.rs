// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use clap::Parser;
use rust_incubator::config::{Config, DriverKind};
use rust_incubator::events::EventHub;
use rust_incubator::protocol::{decode_float, IncubState, LimitSwitch};
use rust_incubator::transport::TransportClient;
use std::path::PathBuf;

/// Read a range of holding registers from the incubation analyzer
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file providing the serial settings
    #[clap(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Serial device, overrides the configuration
    #[clap(long)]
    device: Option<String>,

    /// Modbus slave id, overrides the configuration
    #[clap(long)]
    slave_id: Option<u8>,

    /// Use the simulated instrument
    #[clap(long)]
    simulated: bool,

    /// Starting holding register address
    #[clap(long, default_value = "1")]
    address: u16,

    /// Number of registers to read
    #[clap(long, default_value = "7")]
    quantity: u16,

    /// Decode the first two registers as a float (low word first)
    #[clap(long)]
    float: bool,
}

/// Address of the `offset`-th register of a read. A read may end past 65535.
fn register_at(start: u16, offset: usize) -> u32 {
    u32::from(start) + offset as u32
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    config.apply_args(args.device, args.slave_id, None, args.simulated);
    config.validate()?;

    let target = match config.engine.driver {
        DriverKind::Rtu => format!("{} slave {}", config.serial.device, config.serial.slave_id),
        DriverKind::Simulated => "simulated instrument".to_string(),
    };
    println!("Connecting to {}", target);

    let client = TransportClient::new(rust_incubator::build_driver(&config), EventHub::new());
    if !client.ensure_connected() {
        anyhow::bail!("Could not open the link to {}", target);
    }

    println!(
        "Reading {} holding registers starting at address {}",
        args.quantity, args.address
    );
    let response = client
        .read_block(args.address, args.quantity)
        .with_context(|| format!("Read of {} registers at {} failed", args.quantity, args.address))?;

    // Display raw results
    println!("Raw register values: {:?}", response);

    if args.float {
        println!("Float (low, high): {}", decode_float(&response));
    }

    // Annotate against the instrument register map
    for (i, value) in response.iter().enumerate() {
        let register = register_at(args.address, i);
        match register {
            1 | 3 => {
                let name = if register == 1 {
                    "Current Temperature"
                } else {
                    "Target Temperature"
                };
                match response.get(i..i + 2) {
                    Some(words) => println!(
                        "Register {}: {} = {:.2} °C",
                        register,
                        name,
                        decode_float(words)
                    ),
                    None => println!("Register {}: {} (incomplete)", register, name),
                }
            }
            2 | 4 => println!("Register {}: High word = {:#06x}", register, value),
            5 => {
                let switches = LimitSwitch(*value);
                println!(
                    "Register 5: Limit Switch = {:#010b} (home={}, limit={}, slots={:?})",
                    value,
                    switches.slide_home(),
                    switches.slide_limit(),
                    switches.slots()
                );
            }
            6 => println!("Register 6: Incubation Finish Mask = {:#08b}", value),
            7 => println!(
                "Register 7: Incubation State = {} ({})",
                value,
                IncubState::from(*value)
            ),
            22 => println!("Register 22: Motor Speed = {}", value),
            23 => println!("Register 23: Motor State = {}", value),
            24 => println!("Register 24: Motor Steps = {}", value),
            _ => println!("Register {}: Value = {}", register, value),
        }
    }

    client.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_at_top_of_address_space() {
        assert_eq!(register_at(1, 0), 1);
        assert_eq!(register_at(u16::MAX, 0), 65535);
        assert_eq!(register_at(u16::MAX, 1), 65536);
        assert_eq!(register_at(65530, 10), 65540);
    }
}
