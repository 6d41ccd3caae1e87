// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device change notifications
//!
//! The engine publishes one [`DeviceEvent`] per logical field whose value actually
//! changed, plus link health events. Collaborators (UI, HTTP bridge, loggers)
//! subscribe through an [`EventHub`], a broadcast channel that needs no async
//! runtime on the sending side.

use crate::protocol::{IncubFinishMask, IncubState, LimitSwitch};
use log::trace;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the slowest one starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A discrete change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DeviceEvent {
    CurrentTemperature(f32),
    TargetTemperature(f32),
    LimitSwitch(LimitSwitch),
    IncubationFinish(IncubFinishMask),
    IncubationState(IncubState),
    MotorState(u16),
    MotorSteps(u16),
    MotorSpeed(u16),
    Fluorescence(u16),
    /// Countdown of a zero-based incubation slot changed
    IncubationRemaining { slot: usize, remaining_seconds: u32 },
    /// Countdown of a zero-based incubation slot reached zero
    IncubationTimeout { slot: usize },
    /// Link state changed (`true` = connected)
    Connection(bool),
    /// A bus transaction failed
    IoError(String),
}

/// Fan-out of [`DeviceEvent`]s to any number of subscribers.
///
/// Cloning the hub shares the channel. A subscriber only sees events emitted
/// after it subscribed.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<DeviceEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a receiver for every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event to every live subscriber
    pub fn emit(&self, event: DeviceEvent) {
        // Nobody listening is not an error for the engine
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            trace!("No subscriber for {:?}", event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
