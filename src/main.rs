// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the incubation analyzer device daemon
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rust_incubator::config::{self, Config};
use rust_incubator::events::DeviceEvent;
use tokio::sync::broadcast::error::RecvError;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Device engine daemon for the incubation analyzer
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (created with defaults if missing)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Serial device, overrides serial.device
    #[arg(long)]
    device: Option<String>,

    /// Modbus slave id, overrides serial.slave_id
    #[arg(long)]
    slave_id: Option<u8>,

    /// Status poll period in milliseconds, overrides engine.poll_interval_ms
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Run against the simulated instrument instead of the serial link
    #[arg(long)]
    simulated: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    config.apply_args(
        args.device,
        args.slave_id,
        args.poll_interval_ms,
        args.simulated,
    );
    config.validate()?;
    info!(
        "Starting device engine on {} (slave {}, driver {:?})",
        config.serial.device, config.serial.slave_id, config.engine.driver
    );

    let engine = Arc::new(rust_incubator::build_engine(&config));
    let mut events = engine.subscribe();
    let logger = thread::Builder::new()
        .name("event-log".to_string())
        .spawn(move || loop {
            match events.blocking_recv() {
                Ok(DeviceEvent::IoError(msg)) => warn!("I/O error: {}", msg),
                Ok(DeviceEvent::Connection(up)) => {
                    info!("Link {}", if up { "up" } else { "down" })
                }
                Ok(other) => info!("{:?}", other),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged behind, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        })
        .context("Failed to spawn event logger")?;

    engine.start(config.engine.poll_interval_ms)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    let stopping = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("Engine shutdown task failed")?;

    let status = engine.snapshot();
    info!(
        "Final status: {:.2} °C (target {:.2} °C), {}",
        status.current_temperature, status.target_temperature, status.incubation_state
    );

    // The logger ends once the engine and its event hub are gone
    drop(engine);
    if logger.join().is_err() {
        warn!("Event logger thread panicked");
    }
    Ok(())
}
