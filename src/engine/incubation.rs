// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-slot incubation countdown
//!
//! Slot occupancy comes from the limit switch register. Each occupied slot
//! counts down once per second; reaching zero raises one timeout per
//! occupancy. Every slot carries its own `timeout_notified` flag so that one
//! slot finishing never masks another.

use serde::Serialize;

use crate::events::DeviceEvent;
use crate::protocol::{LimitSwitch, INCUBATION_SLOTS};

/// Countdown state of one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IncubationSlotState {
    pub occupied: bool,
    pub remaining_seconds: u32,
    pub timeout_notified: bool,
}

/// Countdown state machine for all slots
#[derive(Debug, Clone)]
pub struct IncubationTracker {
    total_seconds: u32,
    slots: [IncubationSlotState; INCUBATION_SLOTS],
}

impl IncubationTracker {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            total_seconds,
            slots: [IncubationSlotState::default(); INCUBATION_SLOTS],
        }
    }

    pub fn slots(&self) -> [IncubationSlotState; INCUBATION_SLOTS] {
        self.slots
    }

    /// Apply a fresh limit switch reading and report the slots that changed
    pub fn observe(&mut self, switches: LimitSwitch) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        for (slot, state) in self.slots.iter_mut().enumerate() {
            let occupied = switches.slot_occupied(slot);
            if occupied == state.occupied {
                continue;
            }
            *state = IncubationSlotState {
                occupied,
                remaining_seconds: if occupied { self.total_seconds } else { 0 },
                timeout_notified: false,
            };
            events.push(DeviceEvent::IncubationRemaining {
                slot,
                remaining_seconds: state.remaining_seconds,
            });
        }
        events
    }

    /// Advance every occupied slot by one second
    pub fn tick(&mut self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        for (slot, state) in self.slots.iter_mut().enumerate() {
            if !state.occupied {
                continue;
            }
            if state.remaining_seconds > 0 {
                state.remaining_seconds -= 1;
                events.push(DeviceEvent::IncubationRemaining {
                    slot,
                    remaining_seconds: state.remaining_seconds,
                });
            }
            if state.remaining_seconds == 0 && !state.timeout_notified {
                state.timeout_notified = true;
                events.push(DeviceEvent::IncubationTimeout { slot });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeouts(events: &[DeviceEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::IncubationTimeout { .. }))
            .count()
    }

    #[test]
    fn test_full_countdown_fires_once() {
        let mut tracker = IncubationTracker::new(360);
        let events = tracker.observe(LimitSwitch::default().with_slot(0, true));
        assert_eq!(
            events,
            vec![DeviceEvent::IncubationRemaining {
                slot: 0,
                remaining_seconds: 360
            }]
        );

        let mut fired = 0;
        for second in 1..=360 {
            let events = tracker.tick();
            fired += timeouts(&events);
            assert_eq!(tracker.slots()[0].remaining_seconds, 360 - second);
            if second < 360 {
                assert_eq!(fired, 0, "timeout fired early at second {}", second);
            }
        }
        assert_eq!(fired, 1);
        assert!(tracker.slots()[0].timeout_notified);

        for _ in 0..10 {
            assert!(tracker.tick().is_empty());
        }
        assert_eq!(tracker.slots()[0].remaining_seconds, 0);
    }

    #[test]
    fn test_vacate_and_reoccupy_rearms() {
        let mut tracker = IncubationTracker::new(2);
        let occupied = LimitSwitch::default().with_slot(4, true);
        tracker.observe(occupied);
        tracker.tick();
        assert_eq!(timeouts(&tracker.tick()), 1);

        let events = tracker.observe(LimitSwitch::default());
        assert_eq!(
            events,
            vec![DeviceEvent::IncubationRemaining {
                slot: 4,
                remaining_seconds: 0
            }]
        );
        assert_eq!(tracker.slots()[4], IncubationSlotState::default());

        tracker.observe(occupied);
        assert_eq!(tracker.slots()[4].remaining_seconds, 2);
        assert!(!tracker.slots()[4].timeout_notified);
        tracker.tick();
        assert_eq!(timeouts(&tracker.tick()), 1);
    }

    #[test]
    fn test_slots_time_out_independently() {
        let mut tracker = IncubationTracker::new(3);
        tracker.observe(LimitSwitch::default().with_slot(0, true));
        tracker.tick();
        tracker.tick();
        tracker.observe(LimitSwitch::default().with_slot(0, true).with_slot(1, true));

        let events = tracker.tick();
        assert!(events.contains(&DeviceEvent::IncubationTimeout { slot: 0 }));
        assert!(tracker.slots()[0].timeout_notified);
        assert!(!tracker.slots()[1].timeout_notified);
        assert_eq!(tracker.slots()[1].remaining_seconds, 2);

        assert_eq!(timeouts(&tracker.tick()), 0);
        let events = tracker.tick();
        // Slot 0 already notified, slot 1 still fires on its own edge
        assert_eq!(timeouts(&events), 1);
        assert!(events.contains(&DeviceEvent::IncubationTimeout { slot: 1 }));
        assert!(tracker.slots()[1].timeout_notified);
    }

    #[test]
    fn test_unchanged_reading_is_silent() {
        let mut tracker = IncubationTracker::new(10);
        let switches = LimitSwitch(LimitSwitch::SLIDE_HOME).with_slot(2, true);
        assert_eq!(tracker.observe(switches).len(), 1);
        assert!(tracker.observe(switches).is_empty());
        assert!(IncubationTracker::new(10).tick().is_empty());
    }
}
