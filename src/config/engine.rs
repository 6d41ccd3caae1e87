// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device engine configuration

use serde::{Deserialize, Serialize};

/// Bus driver backing the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Modbus-RTU over the configured serial port
    #[default]
    Rtu,
    /// In-memory instrument, no hardware needed
    Simulated,
}

/// Timing of the polling engine and incubation countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Period of the status poll in milliseconds (default 500)
    pub poll_interval_ms: u64,

    /// Countdown of each incubation slot in seconds (default 360)
    pub incubation_seconds: u32,

    #[serde(default)]
    pub driver: DriverKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            incubation_seconds: crate::engine::DEFAULT_INCUBATION_SECONDS,
            driver: DriverKind::Rtu,
        }
    }
}
