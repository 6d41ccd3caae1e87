// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Function descriptor table
//!
//! Every logical operation the engine can perform on the instrument is identified
//! by a [`FunctionId`] and described by exactly one [`FunctionDescriptor`] in
//! [`FUNCTION_TABLE`]. The table is plain static data, so lookups are lock-free
//! and there is no initialization order to get wrong.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of the two-register target temperature (float32, low word first)
pub const TARGET_TEMP_ADDRESS: u16 = 3;

/// Address of the incubation timeout signal register
pub const INCUB_TIMEOUT_ADDRESS: u16 = 8;

/// Logical function identifiers understood by the instrument firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionId {
    /// Measured chamber temperature
    CurrentTemp,
    /// Temperature setpoint (read back and written)
    TargetTemp,
    /// Slide and incubation slot micro-switches
    LimitSwitch,
    /// Per-slot "incubation finished" flags
    IncubFinishMask,
    /// Heating / stable state of the incubator
    IncubState,
    /// Incubation timeout signal (write 1)
    IncubTimeout,
    /// Send the slide to its home position
    MotorHome,
    /// Start a detection run
    MotorStart,
    /// Motor speed parameter
    MotorSpeed,
    /// Motor state register
    MotorState,
    /// Motor step counter, read variant
    ReadMotorSteps,
    /// Motor step counter, write variant
    WriteMotorSteps,
    /// Fluorescence module enable
    FluorescenceEnable,
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Encoding of the value held by a register range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Plain unsigned 16-bit integer
    U16,
    /// IEEE-754 binary32 spread over two registers, low word first
    Float32,
    /// Bit field with firmware-defined bit positions
    Bitmask,
    /// Trigger register, the written value carries no meaning
    None,
}

/// Static description of one logical function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub id: FunctionId,
    pub start_address: u16,
    pub register_count: u16,
    pub value_kind: ValueKind,
    /// May be fetched with a block read
    pub can_read: bool,
    /// May be the target of a write command
    pub can_write: bool,
    /// Included in the periodic status poll
    pub can_poll: bool,
}

impl FunctionDescriptor {
    const fn new(
        id: FunctionId,
        start_address: u16,
        register_count: u16,
        value_kind: ValueKind,
        can_read: bool,
        can_write: bool,
        can_poll: bool,
    ) -> Self {
        Self {
            id,
            start_address,
            register_count,
            value_kind,
            can_read,
            can_write,
            can_poll,
        }
    }

    /// First address past the end of this descriptor's register range
    pub fn end_address(&self) -> u32 {
        u32::from(self.start_address) + u32::from(self.register_count)
    }
}

/// Register map fixed by the instrument firmware.
///
/// Columns: id, address, width, encoding, can_read, can_write, can_poll.
pub const FUNCTION_TABLE: [FunctionDescriptor; 13] = [
    // Temperature
    FunctionDescriptor::new(FunctionId::CurrentTemp, 1, 2, ValueKind::Float32, true, false, true),
    FunctionDescriptor::new(FunctionId::TargetTemp, TARGET_TEMP_ADDRESS, 2, ValueKind::Float32, true, true, false),
    // Incubation
    FunctionDescriptor::new(FunctionId::LimitSwitch, 5, 1, ValueKind::Bitmask, true, false, true),
    FunctionDescriptor::new(FunctionId::IncubFinishMask, 6, 1, ValueKind::Bitmask, true, true, false),
    FunctionDescriptor::new(FunctionId::IncubState, 7, 1, ValueKind::U16, true, false, true),
    FunctionDescriptor::new(FunctionId::IncubTimeout, INCUB_TIMEOUT_ADDRESS, 1, ValueKind::U16, false, true, false),
    // Motor commands
    FunctionDescriptor::new(FunctionId::MotorHome, 20, 1, ValueKind::None, false, true, false),
    FunctionDescriptor::new(FunctionId::MotorStart, 21, 1, ValueKind::None, false, true, false),
    // Motor parameters and state
    FunctionDescriptor::new(FunctionId::MotorSpeed, 22, 1, ValueKind::U16, true, true, false),
    FunctionDescriptor::new(FunctionId::MotorState, 23, 1, ValueKind::U16, false, false, false),
    FunctionDescriptor::new(FunctionId::ReadMotorSteps, 24, 1, ValueKind::U16, true, false, true),
    FunctionDescriptor::new(FunctionId::WriteMotorSteps, 24, 1, ValueKind::U16, false, true, false),
    // Optics
    FunctionDescriptor::new(FunctionId::FluorescenceEnable, 25, 1, ValueKind::U16, false, true, false),
];

/// Read-only view over a descriptor table.
///
/// The engine always runs with [`ProtocolTable::standard`]; other tables are
/// useful to exercise reduced or reordered register maps.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolTable {
    descriptors: &'static [FunctionDescriptor],
}

impl Default for ProtocolTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProtocolTable {
    /// The instrument's register map
    pub fn standard() -> Self {
        Self {
            descriptors: &FUNCTION_TABLE,
        }
    }

    /// Wrap an arbitrary static descriptor slice
    pub fn from_static(descriptors: &'static [FunctionDescriptor]) -> Self {
        Self { descriptors }
    }

    /// Find the descriptor for a function.
    ///
    /// `None` means the table has no entry for `id`, which callers treat as a
    /// configuration error.
    pub fn lookup(&self, id: FunctionId) -> Option<&'static FunctionDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// All descriptors in table order
    pub fn descriptors(&self) -> &'static [FunctionDescriptor] {
        self.descriptors
    }

    /// Descriptors taking part in the periodic poll, in table order
    pub fn pollable(&self) -> impl Iterator<Item = &'static FunctionDescriptor> {
        self.descriptors.iter().filter(|d| d.can_poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let mut seen = HashSet::new();
        for d in FUNCTION_TABLE.iter() {
            assert!(seen.insert(d.id), "duplicate table entry for {}", d.id);
        }
    }

    #[test]
    fn test_lookup_matches_firmware_map() {
        let table = ProtocolTable::standard();

        let current = table.lookup(FunctionId::CurrentTemp).unwrap();
        assert_eq!((current.start_address, current.register_count), (1, 2));
        assert_eq!(current.value_kind, ValueKind::Float32);

        let target = table.lookup(FunctionId::TargetTemp).unwrap();
        assert_eq!(target.start_address, TARGET_TEMP_ADDRESS);
        assert!(target.can_write && target.can_read && !target.can_poll);

        let timeout = table.lookup(FunctionId::IncubTimeout).unwrap();
        assert_eq!(timeout.start_address, INCUB_TIMEOUT_ADDRESS);
        assert!(timeout.can_write && !timeout.can_read);

        let read_steps = table.lookup(FunctionId::ReadMotorSteps).unwrap();
        let write_steps = table.lookup(FunctionId::WriteMotorSteps).unwrap();
        assert_eq!(read_steps.start_address, write_steps.start_address);
        assert!(read_steps.can_poll && !write_steps.can_poll);
    }

    #[test]
    fn test_pollable_subset() {
        let polled: Vec<FunctionId> = ProtocolTable::standard().pollable().map(|d| d.id).collect();
        assert_eq!(
            polled,
            vec![
                FunctionId::CurrentTemp,
                FunctionId::LimitSwitch,
                FunctionId::IncubState,
                FunctionId::ReadMotorSteps,
            ]
        );
    }

    #[test]
    fn test_missing_entry_is_none() {
        static PARTIAL: [FunctionDescriptor; 1] = [FunctionDescriptor::new(
            FunctionId::LimitSwitch,
            5,
            1,
            ValueKind::Bitmask,
            true,
            false,
            true,
        )];
        let table = ProtocolTable::from_static(&PARTIAL);
        assert!(table.lookup(FunctionId::TargetTemp).is_none());
        assert!(table.lookup(FunctionId::LimitSwitch).is_some());
    }
}
