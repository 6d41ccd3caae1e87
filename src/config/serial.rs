// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Serial link configuration
//!
//! This module defines the settings of the RS-485 Modbus-RTU link to the
//! instrument.

use serde::{Deserialize, Serialize};

/// Parity setting of the serial line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

/// Configuration of the Modbus-RTU serial link.
///
/// # Example
///
/// ```
/// use rust_incubator::config::{Parity, SerialConfig};
///
/// let serial = SerialConfig {
///     device: "/dev/ttyUSB0".to_string(),
///     parity: Parity::Even,
///     ..Default::default()
/// };
/// assert_eq!(serial.slave_id, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial device path (default `/dev/ttyS4`)
    pub device: String,

    /// Line speed in baud (default 115200)
    pub baud_rate: u32,

    #[serde(default)]
    pub parity: Parity,

    /// 5 to 8, default 8
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// 1 or 2, default 1
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Modbus slave address of the instrument, 1 to 247 (default 2)
    pub slave_id: u8,

    /// Maximum wait for a response in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Maximum silence between two response bytes in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub byte_timeout_ms: u64,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    300
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyS4".to_string(),
            baud_rate: 115200,
            parity: Parity::None,
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            slave_id: 2,
            response_timeout_ms: default_timeout_ms(),
            byte_timeout_ms: default_timeout_ms(),
        }
    }
}
