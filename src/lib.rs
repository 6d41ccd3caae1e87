// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Incubator library
//!
//! Device polling and command engine for a motorized, temperature-controlled
//! incubation analyzer connected over Modbus-RTU (RS-485).
//!
//! - [`protocol`]: register map, codec and firmware bit layouts
//! - [`transport`]: serialized link access with reconnect policy and bus drivers
//! - [`engine`]: polling scheduler, command queue, incubation countdown, status snapshot
//! - [`events`]: per-field change notifications
//! - [`config`]: YAML configuration validated against an embedded JSON schema

pub mod config;
pub mod engine;
pub mod events;
pub mod protocol;
pub mod transport;

use std::sync::Arc;

use config::{Config, DriverKind};
use engine::DeviceEngine;
use events::EventHub;
use transport::{BusDriver, RtuDriver, SimulatedInstrument, TransportClient};

/// Simulated chamber heating rate in °C per second
const SIMULATED_HEATING_RATE: f32 = 0.5;

/// Build the bus driver selected by the configuration
pub fn build_driver(config: &Config) -> Box<dyn BusDriver + Send> {
    match config.engine.driver {
        DriverKind::Rtu => Box::new(RtuDriver::new(config.serial.clone())),
        DriverKind::Simulated => {
            Box::new(SimulatedInstrument::new().with_thermal_drift(SIMULATED_HEATING_RATE))
        }
    }
}

/// Wire a stopped engine from the configuration
pub fn build_engine(config: &Config) -> DeviceEngine {
    let events = EventHub::new();
    let transport = TransportClient::new(build_driver(config), events.clone());
    DeviceEngine::new(Arc::new(transport), events)
        .with_incubation_seconds(config.engine.incubation_seconds)
}
