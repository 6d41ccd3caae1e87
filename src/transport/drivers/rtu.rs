// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus-RTU serial driver
//!
//! Uses the synchronous RTU client of `tokio-modbus`, which runs its own
//! single-threaded runtime internally, so it can be driven from the engine's
//! plain OS thread.

use std::io;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_modbus::client::sync::{rtu, Context, Reader, Writer};
use tokio_modbus::{ExceptionCode, Slave};

use super::BusDriver;
use crate::config::{Parity, SerialConfig};
use crate::transport::error::{DeviceException, TransportError, TransportResult};

/// Serial Modbus-RTU link to a single slave
pub struct RtuDriver {
    config: SerialConfig,
    ctx: Option<Context>,
}

impl RtuDriver {
    pub fn new(config: SerialConfig) -> Self {
        Self { config, ctx: None }
    }

    fn port_builder(&self) -> tokio_serial::SerialPortBuilder {
        let parity = match self.config.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        };
        let data_bits = match self.config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };
        let stop_bits = match self.config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        };

        tokio_serial::new(&self.config.device, self.config.baud_rate)
            .parity(parity)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(self.config.byte_timeout_ms))
    }

    fn context(&mut self) -> TransportResult<&mut Context> {
        self.ctx.as_mut().ok_or(TransportError::NotConnected)
    }
}

/// Flatten the nested `tokio_modbus` result into our taxonomy
fn classify<T>(result: tokio_modbus::Result<T>) -> TransportResult<T> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(code)) => Err(TransportError::Exception(map_exception(code))),
        Err(tokio_modbus::Error::Transport(err)) => Err(TransportError::Link(err)),
        Err(err) => Err(TransportError::Framing(err.to_string())),
    }
}

fn map_exception(code: ExceptionCode) -> DeviceException {
    match code {
        ExceptionCode::IllegalFunction => DeviceException::IllegalFunction,
        ExceptionCode::IllegalDataAddress => DeviceException::IllegalDataAddress,
        ExceptionCode::IllegalDataValue => DeviceException::IllegalDataValue,
        ExceptionCode::ServerDeviceFailure => DeviceException::ServerDeviceFailure,
        other => DeviceException::Other(format!("{:?}", other)),
    }
}

impl BusDriver for RtuDriver {
    fn open(&mut self) -> TransportResult<()> {
        self.close();

        let builder = self.port_builder();
        let timeout = Duration::from_millis(self.config.response_timeout_ms);
        let ctx = rtu::connect_slave_with_timeout(&builder, Slave(self.config.slave_id), Some(timeout))
            .map_err(|e| {
                warn!("Failed to open {}: {}", self.config.device, e);
                TransportError::Link(e)
            })?;

        info!(
            "Opened Modbus-RTU link on {} ({} baud, slave {})",
            self.config.device, self.config.baud_rate, self.config.slave_id
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the context releases the serial port
        if self.ctx.take().is_some() {
            debug!("Closed Modbus-RTU link on {}", self.config.device);
        }
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> TransportResult<Vec<u16>> {
        let words = classify(self.context()?.read_holding_registers(address, count))?;
        if words.len() != usize::from(count) {
            return Err(TransportError::ShortResponse {
                expected: usize::from(count),
                actual: words.len(),
            });
        }
        Ok(words)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> TransportResult<()> {
        if values.is_empty() {
            return Err(TransportError::Link(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty register write",
            )));
        }
        classify(self.context()?.write_multiple_registers(address, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_mapping() {
        assert_eq!(
            map_exception(ExceptionCode::IllegalDataAddress),
            DeviceException::IllegalDataAddress
        );
        assert_eq!(
            map_exception(ExceptionCode::ServerDeviceFailure),
            DeviceException::ServerDeviceFailure
        );
        assert!(matches!(
            map_exception(ExceptionCode::Acknowledge),
            DeviceException::Other(_)
        ));
    }

    #[test]
    fn test_classify() {
        let ok: tokio_modbus::Result<u16> = Ok(Ok(5));
        assert_eq!(classify(ok).unwrap(), 5);

        let exception: tokio_modbus::Result<u16> = Ok(Err(ExceptionCode::IllegalFunction));
        assert!(!classify(exception).unwrap_err().is_link_failure());

        let transport: tokio_modbus::Result<u16> = Err(tokio_modbus::Error::Transport(
            io::Error::new(io::ErrorKind::TimedOut, "timeout"),
        ));
        assert!(classify(transport).unwrap_err().is_link_failure());
    }

    #[test]
    fn test_closed_driver_reports_not_connected() {
        let mut driver = RtuDriver::new(SerialConfig::default());
        assert!(matches!(
            driver.read_holding_registers(1, 2),
            Err(TransportError::NotConnected)
        ));
        driver.close();
    }
}
