// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bus drivers for the instrument link
//!
//! This module provides the hardware seam below [`TransportClient`](super::TransportClient):
//! - RTU: Modbus-RTU over an RS-485 serial port
//! - Simulated: in-memory instrument for tests and bench runs without hardware

pub mod rtu;
pub mod simulated;

pub use rtu::RtuDriver;
pub use simulated::{BusOp, Fault, SimulatedInstrument};

use super::error::TransportResult;

/// Raw register access to one slave on one bus.
///
/// Implementations perform a single transaction per call and never retry;
/// retry and reconnect policy belongs to the transport client.
#[cfg_attr(test, mockall::automock)]
pub trait BusDriver {
    /// Open the link. Calling it on an open link reopens it.
    fn open(&mut self) -> TransportResult<()>;

    /// Release the link. Closing a closed link is a no-op.
    fn close(&mut self);

    /// Modbus function 0x03
    fn read_holding_registers(&mut self, address: u16, count: u16) -> TransportResult<Vec<u16>>;

    /// Modbus function 0x10
    fn write_registers(&mut self, address: u16, values: &[u16]) -> TransportResult<()>;
}
