// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument protocol description
//!
//! This module describes the subset of Modbus holding registers exposed by the
//! incubation analyzer firmware and how their raw 16-bit words map to typed values.
//!
//! ## Key Components
//!
//! - [`ProtocolTable`]: compiled-in registry of [`FunctionDescriptor`]s, one per
//!   logical [`FunctionId`].
//! - [`codec`]: pure conversions between register words and typed values.
//! - [`registers`]: firmware-fixed bit layouts (limit switches, incubation finish mask)
//!   and the incubation state enumeration.
//!
//! ## Register Map
//!
//! | Function | Address | Width | Encoding | R/W/Poll |
//! |---|---|---|---|---|
//! | CurrentTemp | 1 | 2 | float32 (low, high) | R / - / Poll |
//! | TargetTemp | 3 | 2 | float32 (low, high) | R / W / - |
//! | LimitSwitch | 5 | 1 | bitmask | R / - / Poll |
//! | IncubFinishMask | 6 | 1 | bitmask | R / W / - |
//! | IncubState | 7 | 1 | u16 enum | R / - / Poll |
//! | IncubTimeout | 8 | 1 | u16 (write 1) | - / W / - |
//! | MotorHome | 20 | 1 | trigger | - / W / - |
//! | MotorStart | 21 | 1 | trigger | - / W / - |
//! | MotorSpeed | 22 | 1 | u16 | R / W / - |
//! | MotorState | 23 | 1 | u16 | - / - / - |
//! | MotorSteps (read) | 24 | 1 | u16 | R / - / Poll |
//! | MotorSteps (write) | 24 | 1 | u16 | - / W / - |
//! | FluorescenceEnable | 25 | 1 | u16 | - / W / - |

pub mod codec;
pub mod registers;
pub mod table;

pub use codec::{decode_float, encode_float};
pub use registers::{IncubFinishMask, IncubState, LimitSwitch, INCUBATION_SLOTS};
pub use table::{
    FunctionDescriptor, FunctionId, ProtocolTable, ValueKind, FUNCTION_TABLE,
    INCUB_TIMEOUT_ADDRESS, TARGET_TEMP_ADDRESS,
};
