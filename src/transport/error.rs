// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Transport error taxonomy

use std::io;
use thiserror::Error;

/// Exception returned by the instrument for a well-formed request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceException {
    #[error("illegal function")]
    IllegalFunction,
    #[error("illegal data address")]
    IllegalDataAddress,
    #[error("illegal data value")]
    IllegalDataValue,
    #[error("server device failure")]
    ServerDeviceFailure,
    #[error("device exception: {0}")]
    Other(String),
}

/// Failure of a single bus transaction
#[derive(Debug, Error)]
pub enum TransportError {
    /// The instrument answered with a Modbus exception
    #[error("protocol exception: {0}")]
    Exception(#[from] DeviceException),

    /// Timeout, I/O error or missing response
    #[error("link failure: {0}")]
    Link(#[from] io::Error),

    /// Corrupted or unexpected frame (CRC, function code mismatch)
    #[error("framing error: {0}")]
    Framing(String),

    /// The device answered with fewer registers than requested
    #[error("short response: expected {expected} registers, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// No link could be opened
    #[error("not connected")]
    NotConnected,
}

impl TransportError {
    /// Whether the failure means the link itself is unhealthy.
    ///
    /// Device exceptions leave the connection usable, every other failure
    /// forces a reconnect.
    pub fn is_link_failure(&self) -> bool {
        !matches!(self, TransportError::Exception(_))
    }

    /// Shorthand for a link timeout
    pub fn timeout(context: &str) -> Self {
        TransportError::Link(io::Error::new(io::ErrorKind::TimedOut, context.to_string()))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
