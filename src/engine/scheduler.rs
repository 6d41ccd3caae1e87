// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Engine control loop
//!
//! Runs on the engine's dedicated thread. Each iteration:
//!
//! 1. advances the incubation countdown for every whole second elapsed,
//! 2. runs an engine-generated batch (incubation timeout write) if one is due,
//! 3. waits on the command queue until the next poll or second tick,
//! 4. executes one queued batch if there is one (commands beat polling),
//! 5. otherwise polls the instrument once the poll deadline is reached.
//!
//! Registers that are readable but not polled (setpoint, finish mask, motor
//! speed) are read once per connection, right before the first poll on it.
//!
//! The loop ends when the queue is closed and empty.

use std::cmp::min;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};

use super::command::{ExecItem, WriteBlock};
use super::error::CommandError;
use super::incubation::IncubationTracker;
use super::poll::{demux, merge_requests, poll_requests, refresh_requests, ReadRequest};
use super::queue::{CommandQueue, QueueWait};
use super::status::{DeviceStatus, StatusStore};
use crate::events::{DeviceEvent, EventHub};
use crate::protocol::{
    codec, FunctionDescriptor, FunctionId, IncubFinishMask, IncubState, LimitSwitch,
    ProtocolTable,
};
use crate::transport::TransportClient;

const TICK: Duration = Duration::from_secs(1);

pub(crate) struct Scheduler {
    transport: Arc<TransportClient>,
    table: ProtocolTable,
    queue: Arc<CommandQueue>,
    store: Arc<StatusStore>,
    events: EventHub,
    poll_interval: Duration,
    status: DeviceStatus,
    incubation: IncubationTracker,
    next_poll: Instant,
    next_tick: Instant,
    /// Batches raised by the engine itself, run ahead of the queue
    backlog: VecDeque<Vec<ExecItem>>,
    /// Link generation whose non-polled registers have been read
    refreshed_generation: Option<u64>,
}

impl Scheduler {
    pub(crate) fn new(
        transport: Arc<TransportClient>,
        table: ProtocolTable,
        queue: Arc<CommandQueue>,
        store: Arc<StatusStore>,
        events: EventHub,
        poll_interval: Duration,
        incubation_seconds: u32,
    ) -> Self {
        let now = Instant::now();
        Self {
            transport,
            table,
            queue,
            store,
            events,
            poll_interval,
            status: DeviceStatus::default(),
            incubation: IncubationTracker::new(incubation_seconds),
            next_poll: now,
            next_tick: now + TICK,
            backlog: VecDeque::new(),
            refreshed_generation: None,
        }
    }

    pub(crate) fn run(mut self) {
        info!(
            "Device engine started (poll interval {} ms)",
            self.poll_interval.as_millis()
        );
        self.transport.ensure_connected();
        self.publish();

        loop {
            self.run_ticks(Instant::now());

            if let Some(batch) = self.backlog.pop_front() {
                self.execute_batch(batch);
                continue;
            }

            match self.queue.pop_blocking_until(min(self.next_poll, self.next_tick)) {
                QueueWait::Batch(batch) => {
                    self.execute_batch(batch);
                    continue;
                }
                QueueWait::Closed => break,
                QueueWait::Deadline => {}
            }

            if Instant::now() >= self.next_poll && self.queue.is_empty() {
                self.refresh_on_new_link();
                self.poll_once();
                self.next_poll = Instant::now() + self.poll_interval;
            }
        }

        info!("Device engine stopped");
    }

    /// Apply every whole second elapsed since the last tick
    fn run_ticks(&mut self, now: Instant) {
        let mut changed = false;
        while now >= self.next_tick {
            self.next_tick += TICK;
            for event in self.incubation.tick() {
                changed = true;
                if let DeviceEvent::IncubationTimeout { slot } = event {
                    info!("Incubation slot {} timed out, notifying instrument", slot + 1);
                    self.backlog.push_back(vec![ExecItem::incubation_timeout()]);
                }
                self.events.emit(event);
            }
        }
        if changed {
            self.publish();
        }
    }

    fn execute_batch(&mut self, batch: Vec<ExecItem>) {
        debug!("Executing batch of {} command(s)", batch.len());
        for item in batch {
            if let Err(err) = self.execute(item) {
                match err {
                    CommandError::Transport { .. } => error!("{}", err),
                    _ => warn!("Dropping command {:?}: {}", item, err),
                }
            }
        }
        self.publish();
    }

    fn execute(&mut self, item: ExecItem) -> Result<(), CommandError> {
        let descriptor = self
            .table
            .lookup(item.function)
            .ok_or(CommandError::UnknownFunction(item.function))?;
        if !descriptor.can_write {
            return Err(CommandError::NotWritable(item.function));
        }

        let block = WriteBlock::for_descriptor(descriptor, item.value)?;
        self.transport
            .write_block(block.start_address, &block.values)
            .map_err(|source| CommandError::Transport {
                function: item.function,
                source,
            })?;
        info!("{} <- {:?}", item.function, item.value);

        if descriptor.can_read {
            self.read_back(descriptor);
        }
        Ok(())
    }

    fn read_back(&mut self, descriptor: &FunctionDescriptor) {
        match self
            .transport
            .read_block(descriptor.start_address, descriptor.register_count)
        {
            Ok(words) => self.apply_reading(descriptor.id, &words),
            Err(err) => warn!("Read-back of {} failed: {}", descriptor.id, err),
        }
    }

    /// Read the non-polled registers once per link generation
    fn refresh_on_new_link(&mut self) {
        if !self.transport.is_connected() {
            return;
        }
        let generation = self.transport.connection_generation();
        if self.refreshed_generation == Some(generation) {
            return;
        }
        self.refreshed_generation = Some(generation);

        let requests = refresh_requests(&self.table);
        if !requests.is_empty() {
            debug!("Refreshing {} non-polled register(s)", requests.len());
            self.read_requests(&requests);
        }
    }

    fn poll_once(&mut self) {
        let requests = poll_requests(&self.table);
        if self.read_requests(&requests) {
            self.status.updated_at = Some(Utc::now());
        }
        self.publish();
    }

    /// Merge, read and apply `requests`. Returns whether anything was applied.
    fn read_requests(&mut self, requests: &[ReadRequest]) -> bool {
        let mut blocks = merge_requests(requests);

        for block in blocks.iter_mut() {
            match self
                .transport
                .read_block(block.start_address, block.register_count)
            {
                Ok(words) => {
                    if !block.fill(words) {
                        warn!(
                            "Block addr={} returned a wrong length, left unfilled",
                            block.start_address
                        );
                    }
                }
                Err(err) => warn!(
                    "Block addr={} count={} unfilled: {}",
                    block.start_address, block.register_count, err
                ),
            }
        }

        let mut any_filled = false;
        for result in demux(requests, &blocks) {
            if result.filled {
                any_filled = true;
                self.apply_reading(result.function, &result.values);
            } else {
                debug!("{} not refreshed this cycle", result.function);
            }
        }
        any_filled
    }

    /// Decode a register slice into the working status, emitting an event
    /// only when the value differs
    fn apply_reading(&mut self, function: FunctionId, words: &[u16]) {
        let status = &mut self.status;
        let event = match function {
            FunctionId::CurrentTemp => {
                let value = codec::decode_float(words);
                // Bitwise so a NaN reading only notifies once
                (status.current_temperature.to_bits() != value.to_bits()).then(|| {
                    status.current_temperature = value;
                    DeviceEvent::CurrentTemperature(value)
                })
            }
            FunctionId::TargetTemp => {
                let value = codec::decode_float(words);
                (status.target_temperature.to_bits() != value.to_bits()).then(|| {
                    status.target_temperature = value;
                    DeviceEvent::TargetTemperature(value)
                })
            }
            FunctionId::LimitSwitch => {
                let value = LimitSwitch(codec::decode_u16(words));
                for event in self.incubation.observe(value) {
                    self.events.emit(event);
                }
                (status.limit_switch != value).then(|| {
                    status.limit_switch = value;
                    DeviceEvent::LimitSwitch(value)
                })
            }
            FunctionId::IncubFinishMask => {
                let value = IncubFinishMask(codec::decode_u16(words));
                (status.incubation_finish != value).then(|| {
                    status.incubation_finish = value;
                    DeviceEvent::IncubationFinish(value)
                })
            }
            FunctionId::IncubState => {
                let value = IncubState::from(codec::decode_u16(words));
                (status.incubation_state != value).then(|| {
                    status.incubation_state = value;
                    DeviceEvent::IncubationState(value)
                })
            }
            // The standard table marks 23 unreadable; only custom tables reach this
            FunctionId::MotorState => {
                let value = codec::decode_u16(words);
                (status.motor_state != value).then(|| {
                    status.motor_state = value;
                    DeviceEvent::MotorState(value)
                })
            }
            FunctionId::ReadMotorSteps | FunctionId::WriteMotorSteps => {
                let value = codec::decode_u16(words);
                (status.motor_steps != value).then(|| {
                    status.motor_steps = value;
                    DeviceEvent::MotorSteps(value)
                })
            }
            FunctionId::MotorSpeed => {
                let value = codec::decode_u16(words);
                (status.motor_speed != value).then(|| {
                    status.motor_speed = value;
                    DeviceEvent::MotorSpeed(value)
                })
            }
            FunctionId::FluorescenceEnable => {
                let value = codec::decode_u16(words);
                (status.fluorescence != value).then(|| {
                    status.fluorescence = value;
                    DeviceEvent::Fluorescence(value)
                })
            }
            FunctionId::IncubTimeout | FunctionId::MotorHome | FunctionId::MotorStart => None,
        };

        if let Some(event) = event {
            debug!("{} changed: {:?}", function, event);
            self.events.emit(event);
        }
    }

    fn publish(&mut self) {
        self.status.slots = self.incubation.slots();
        self.status.connected = self.transport.is_connected();
        self.store.publish(self.status.clone());
    }
}
