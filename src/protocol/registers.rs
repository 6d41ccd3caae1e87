// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Firmware bit layouts
//!
//! Bit positions are numbered from the least significant bit of the register
//! value and are fixed by the instrument firmware. They do not depend on host
//! endianness and must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of incubation slots on the instrument
pub const INCUBATION_SLOTS: usize = 6;

/// Limit switch register (address 5)
///
/// | Bit | Meaning |
/// |---|---|
/// | 0 | slide at home position |
/// | 1 | slide at limit position |
/// | 2..=7 | incubation slot 1..=6 occupied |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LimitSwitch(pub u16);

impl LimitSwitch {
    pub const SLIDE_HOME: u16 = 1 << 0;
    pub const SLIDE_LIMIT: u16 = 1 << 1;
    /// Bit of incubation slot 0 (slot `n` uses `SLOT_SHIFT + n`)
    pub const SLOT_SHIFT: u16 = 2;
    /// All bits with a meaning
    pub const MASK: u16 = 0x00FF;

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn slide_home(self) -> bool {
        self.0 & Self::SLIDE_HOME != 0
    }

    pub fn slide_limit(self) -> bool {
        self.0 & Self::SLIDE_LIMIT != 0
    }

    /// Occupancy of a zero-based incubation slot. Out of range slots are never occupied.
    pub fn slot_occupied(self, slot: usize) -> bool {
        slot < INCUBATION_SLOTS && self.0 & (1 << (Self::SLOT_SHIFT as usize + slot)) != 0
    }

    /// Occupancy of all slots, index 0 is slot 1
    pub fn slots(self) -> [bool; INCUBATION_SLOTS] {
        std::array::from_fn(|slot| self.slot_occupied(slot))
    }

    /// Return a copy with one slot bit set or cleared
    pub fn with_slot(self, slot: usize, occupied: bool) -> Self {
        if slot >= INCUBATION_SLOTS {
            return self;
        }
        let bit = 1 << (Self::SLOT_SHIFT as usize + slot);
        if occupied {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }
}

/// Incubation finish mask register (address 6), bits 0..=5 flag slots 1..=6 as finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncubFinishMask(pub u16);

impl IncubFinishMask {
    pub const MASK: u16 = 0x003F;

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn slot_finished(self, slot: usize) -> bool {
        slot < INCUBATION_SLOTS && self.0 & (1 << slot) != 0
    }

    pub fn slots(self) -> [bool; INCUBATION_SLOTS] {
        std::array::from_fn(|slot| self.slot_finished(slot))
    }
}

/// Incubator regulation state (address 7)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncubState {
    /// Chamber still heating towards the setpoint
    #[default]
    Heating,
    /// Chamber temperature settled
    Stable,
    /// Any value the firmware does not document
    Unknown(u16),
}

impl From<u16> for IncubState {
    fn from(raw: u16) -> Self {
        match raw {
            0 => IncubState::Heating,
            1 => IncubState::Stable,
            other => IncubState::Unknown(other),
        }
    }
}

impl From<IncubState> for u16 {
    fn from(state: IncubState) -> Self {
        match state {
            IncubState::Heating => 0,
            IncubState::Stable => 1,
            IncubState::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for IncubState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncubState::Heating => write!(f, "heating"),
            IncubState::Stable => write!(f, "stable"),
            IncubState::Unknown(raw) => write!(f, "unknown({})", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_switch_layout() {
        let ls = LimitSwitch(0b0000_0101);
        assert!(ls.slide_home());
        assert!(!ls.slide_limit());
        assert!(ls.slot_occupied(0));
        assert!(!ls.slot_occupied(1));

        let ls = LimitSwitch(0b1000_0010);
        assert!(ls.slide_limit());
        assert_eq!(ls.slots(), [false, false, false, false, false, true]);
        assert!(!ls.slot_occupied(6));
    }

    #[test]
    fn test_with_slot() {
        let ls = LimitSwitch::default().with_slot(2, true).with_slot(5, true);
        assert_eq!(ls.raw(), (1 << 4) | (1 << 7));
        assert_eq!(ls.with_slot(2, false).raw(), 1 << 7);
        assert_eq!(ls.with_slot(9, true), ls);
    }

    #[test]
    fn test_finish_mask_layout() {
        let mask = IncubFinishMask(0b10_0001);
        assert_eq!(mask.slots(), [true, false, false, false, false, true]);
        assert!(!IncubFinishMask(0x40).slot_finished(6));
    }

    #[test]
    fn test_incub_state_conversion() {
        assert_eq!(IncubState::from(0), IncubState::Heating);
        assert_eq!(IncubState::from(1), IncubState::Stable);
        assert_eq!(IncubState::from(7), IncubState::Unknown(7));
        assert_eq!(u16::from(IncubState::Unknown(7)), 7);
        assert_eq!(IncubState::Stable.to_string(), "stable");
    }
}
