// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Write commands submitted by collaborators

use serde::{Deserialize, Serialize};

use super::error::CommandError;
use crate::protocol::{encode_float, FunctionDescriptor, FunctionId, ValueKind};

/// Value carried by a command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExecValue {
    None,
    U16(u16),
    Float(f32),
    Bool(bool),
}

/// One write intent, consumed exactly once by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecItem {
    pub function: FunctionId,
    pub value: ExecValue,
}

impl ExecItem {
    pub fn new(function: FunctionId, value: ExecValue) -> Self {
        Self { function, value }
    }

    /// Fire a trigger register (motor home, motor start)
    pub fn trigger(function: FunctionId) -> Self {
        Self::new(function, ExecValue::None)
    }

    pub fn target_temperature(celsius: f32) -> Self {
        Self::new(FunctionId::TargetTemp, ExecValue::Float(celsius))
    }

    /// Signal an incubation timeout to the instrument
    pub fn incubation_timeout() -> Self {
        Self::new(FunctionId::IncubTimeout, ExecValue::U16(1))
    }
}

/// Register words bound for one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBlock {
    pub start_address: u16,
    pub values: Vec<u16>,
}

impl WriteBlock {
    /// Encode `value` for the register range of `descriptor`
    pub fn for_descriptor(
        descriptor: &FunctionDescriptor,
        value: ExecValue,
    ) -> Result<Self, CommandError> {
        Ok(Self {
            start_address: descriptor.start_address,
            values: encode_value(descriptor, value)?,
        })
    }
}

/// Encode a command value into the register words of `descriptor`.
///
/// - `Float32` accepts `Float` and `U16`
/// - `U16` and `Bitmask` accept `U16` and `Bool`
/// - `None` (trigger) accepts anything and always writes `1`
pub fn encode_value(
    descriptor: &FunctionDescriptor,
    value: ExecValue,
) -> Result<Vec<u16>, CommandError> {
    let words = match (descriptor.value_kind, value) {
        (ValueKind::Float32, ExecValue::Float(v)) => encode_float(v).to_vec(),
        (ValueKind::Float32, ExecValue::U16(v)) => encode_float(f32::from(v)).to_vec(),
        (ValueKind::U16 | ValueKind::Bitmask, ExecValue::U16(v)) => vec![v],
        (ValueKind::U16 | ValueKind::Bitmask, ExecValue::Bool(b)) => vec![u16::from(b)],
        (ValueKind::None, _) => vec![1],
        (kind, value) => {
            return Err(CommandError::ValueMismatch {
                function: descriptor.id,
                kind,
                value,
            })
        }
    };
    Ok(words)
}
