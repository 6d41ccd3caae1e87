// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::io;

use thiserror::Error;

use super::command::ExecValue;
use crate::protocol::{FunctionId, ValueKind};
use crate::transport::TransportError;

/// Failure of a single queued command
#[derive(Debug, Error)]
pub enum CommandError {
    /// The protocol table has no entry for the function
    #[error("no protocol table entry for {0}")]
    UnknownFunction(FunctionId),

    #[error("{0} is not writable")]
    NotWritable(FunctionId),

    #[error("value {value:?} cannot be encoded as {kind:?} for {function}")]
    ValueMismatch {
        function: FunctionId,
        kind: ValueKind,
        value: ExecValue,
    },

    #[error("write of {function} failed: {source}")]
    Transport {
        function: FunctionId,
        #[source]
        source: TransportError,
    },
}

/// Engine lifecycle and admission errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was stopped and no longer admits commands
    #[error("engine is stopped, command queue closed")]
    QueueClosed,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("poll interval must be greater than zero")]
    InvalidPollInterval,

    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] io::Error),
}
