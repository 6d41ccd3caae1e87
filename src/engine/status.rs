// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Published device state
//!
//! The engine thread owns the working [`DeviceStatus`] and publishes whole
//! immutable copies into the [`StatusStore`]. Readers on other threads only
//! ever clone the latest published copy, so they never observe a half-updated
//! snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::incubation::IncubationSlotState;
use crate::protocol::{IncubFinishMask, IncubState, LimitSwitch, INCUBATION_SLOTS};

/// Latest known state of the instrument
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Chamber temperature in °C
    pub current_temperature: f32,
    /// Setpoint in °C, as read back from the instrument
    pub target_temperature: f32,
    pub limit_switch: LimitSwitch,
    pub incubation_finish: IncubFinishMask,
    pub incubation_state: IncubState,
    pub motor_state: u16,
    pub motor_steps: u16,
    pub motor_speed: u16,
    pub fluorescence: u16,
    pub slots: [IncubationSlotState; INCUBATION_SLOTS],
    /// Link health at publication time
    pub connected: bool,
    /// Time of the last poll that returned data
    pub updated_at: Option<DateTime<Utc>>,
}

/// Single-writer, many-reader snapshot cell
#[derive(Debug, Default)]
pub struct StatusStore {
    current: RwLock<Arc<DeviceStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published snapshot
    pub fn publish(&self, status: DeviceStatus) {
        let next = Arc::new(status);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Shared handle to the latest snapshot
    pub fn latest(&self) -> Arc<DeviceStatus> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Owned copy of the latest snapshot
    pub fn snapshot(&self) -> DeviceStatus {
        self.latest().as_ref().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_replaces_snapshot() {
        let store = StatusStore::new();
        assert_eq!(store.snapshot(), DeviceStatus::default());

        let held = store.latest();
        store.publish(DeviceStatus {
            current_temperature: 36.8,
            connected: true,
            ..Default::default()
        });

        // Earlier handles keep their own copy
        assert_eq!(held.current_temperature, 0.0);
        let now = store.snapshot();
        assert_eq!(now.current_temperature, 36.8);
        assert!(now.connected);
    }

    #[test]
    fn test_status_serializes() {
        let json = serde_json::to_value(DeviceStatus::default()).unwrap();
        assert_eq!(json["incubation_state"], "heating");
        assert_eq!(json["slots"].as_array().unwrap().len(), INCUBATION_SLOTS);
        assert!(json["updated_at"].is_null());
    }
}
