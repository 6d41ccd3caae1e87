// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Device polling and command engine
//!
//! [`DeviceEngine`] is the single owner of instrument traffic. It runs one
//! background thread that interleaves periodic status polling with queued
//! write commands, runs the per-slot incubation countdown, and publishes the
//! resulting [`DeviceStatus`] for other components.
//!
//! ## Architecture
//!
//! ```text
//! collaborators ──submit()──▶ CommandQueue ──▶ Scheduler ──▶ TransportClient ──▶ bus
//!                                                 │
//!                                                 ├──▶ StatusStore ──snapshot()──▶ collaborators
//!                                                 └──▶ EventHub ──subscribe()──▶ collaborators
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_incubator::engine::{DeviceEngine, ExecItem};
//! use rust_incubator::events::EventHub;
//! use rust_incubator::transport::{SimulatedInstrument, TransportClient};
//!
//! let events = EventHub::new();
//! let transport = TransportClient::new(Box::new(SimulatedInstrument::new()), events.clone());
//! let engine = DeviceEngine::new(Arc::new(transport), events);
//! engine.start(500).unwrap();
//! engine.submit(vec![ExecItem::target_temperature(37.0)]).unwrap();
//! println!("{:?}", engine.snapshot());
//! engine.stop();
//! ```

pub mod command;
pub mod error;
pub mod incubation;
pub mod poll;
pub mod queue;
mod scheduler;
pub mod status;

pub use command::{encode_value, ExecItem, ExecValue, WriteBlock};
pub use error::{CommandError, EngineError};
pub use incubation::{IncubationSlotState, IncubationTracker};
pub use queue::{CommandQueue, QueueWait};
pub use status::{DeviceStatus, StatusStore};

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::broadcast;

use crate::events::{DeviceEvent, EventHub};
use crate::protocol::ProtocolTable;
use crate::transport::TransportClient;
use scheduler::Scheduler;

/// Default incubation duration per slot
pub const DEFAULT_INCUBATION_SECONDS: u32 = 360;

/// Polling and command engine for one instrument
pub struct DeviceEngine {
    transport: Arc<TransportClient>,
    table: ProtocolTable,
    incubation_seconds: u32,
    queue: Arc<CommandQueue>,
    store: Arc<StatusStore>,
    events: EventHub,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceEngine {
    /// Create a stopped engine on top of `transport`.
    ///
    /// Commands submitted before [`start`](Self::start) are kept and run first.
    pub fn new(transport: Arc<TransportClient>, events: EventHub) -> Self {
        Self {
            transport,
            table: ProtocolTable::standard(),
            incubation_seconds: DEFAULT_INCUBATION_SECONDS,
            queue: Arc::new(CommandQueue::new()),
            store: Arc::new(StatusStore::new()),
            events,
            worker: Mutex::new(None),
        }
    }

    pub fn with_incubation_seconds(mut self, seconds: u32) -> Self {
        self.incubation_seconds = seconds;
        self
    }

    pub fn with_table(mut self, table: ProtocolTable) -> Self {
        self.table = table;
        self
    }

    /// Spawn the engine thread
    pub fn start(&self, poll_interval_ms: u64) -> Result<(), EngineError> {
        if poll_interval_ms == 0 {
            return Err(EngineError::InvalidPollInterval);
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        self.queue.reopen();
        self.store.publish(DeviceStatus::default());
        let scheduler = Scheduler::new(
            Arc::clone(&self.transport),
            self.table,
            Arc::clone(&self.queue),
            Arc::clone(&self.store),
            self.events.clone(),
            Duration::from_millis(poll_interval_ms),
            self.incubation_seconds,
        );

        let handle = thread::Builder::new()
            .name("device-engine".to_string())
            .spawn(move || scheduler.run())
            .map_err(EngineError::Spawn)?;
        *worker = Some(handle);
        Ok(())
    }

    /// Stop admitting commands, let the engine drain its queue, join the
    /// thread and close the link. Safe to call any number of times.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(handle) = worker.take() else {
            debug!("Device engine already stopped");
            return;
        };

        info!("Stopping device engine ({} batch(es) pending)", self.queue.len());
        self.queue.close();
        if handle.join().is_err() {
            error!("Device engine thread panicked");
        }
        self.transport.close();
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Queue a batch of writes. Empty batches are ignored.
    pub fn submit(&self, batch: Vec<ExecItem>) -> Result<(), EngineError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.queue.push(batch)
    }

    /// Copy of the latest published status
    pub fn snapshot(&self) -> DeviceStatus {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
