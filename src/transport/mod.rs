// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Instrument link management
//!
//! [`TransportClient`] owns the single half-duplex link to the instrument. Every
//! transaction holds one lock for its whole duration, so callers on different
//! threads can never interleave frames on the bus.
//!
//! ## Failure policy
//!
//! | Failure | Connection | Reconnect | Result |
//! |---|---|---|---|
//! | Device exception | unchanged | no | error |
//! | Timeout, framing, I/O | marked down | exactly one attempt | error |
//!
//! The failed request is never retried by the client; the engine's next cycle
//! takes care of that.

pub mod drivers;
pub mod error;

pub use drivers::{BusDriver, BusOp, Fault, RtuDriver, SimulatedInstrument};
pub use error::{DeviceException, TransportError, TransportResult};

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::events::{DeviceEvent, EventHub};

/// Silence inserted before each transaction to honour the instrument's
/// inter-frame timing
pub const INTER_FRAME_DELAY: Duration = Duration::from_millis(5);

struct Link {
    driver: Box<dyn BusDriver + Send>,
    connected: bool,
    /// Successful opens so far
    generation: u64,
}

/// Serialized access to the instrument link
pub struct TransportClient {
    link: Mutex<Link>,
    events: EventHub,
}

impl TransportClient {
    /// Wrap a driver. The link stays closed until the first transaction or
    /// an explicit [`ensure_connected`](Self::ensure_connected).
    pub fn new(driver: Box<dyn BusDriver + Send>, events: EventHub) -> Self {
        Self {
            link: Mutex::new(Link {
                driver,
                connected: false,
                generation: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Number of times the link has been opened, reconnects included.
    ///
    /// A change tells the caller that the instrument may have been power
    /// cycled or swapped since it last looked.
    pub fn connection_generation(&self) -> u64 {
        self.lock().generation
    }

    /// Open the link if it is down. One attempt, no retry loop.
    pub fn ensure_connected(&self) -> bool {
        let mut link = self.lock();
        self.connect_locked(&mut link)
    }

    /// Close the link, e.g. on shutdown
    pub fn close(&self) {
        let mut link = self.lock();
        link.driver.close();
        if link.connected {
            link.connected = false;
            info!("Instrument link closed");
            self.events.emit(DeviceEvent::Connection(false));
        }
    }

    /// Read `count` holding registers starting at `address`.
    ///
    /// On success exactly `count` words are returned.
    pub fn read_block(&self, address: u16, count: u16) -> TransportResult<Vec<u16>> {
        let mut link = self.lock();
        if !self.connect_locked(&mut link) {
            return Err(TransportError::NotConnected);
        }

        thread::sleep(INTER_FRAME_DELAY);
        let result = link
            .driver
            .read_holding_registers(address, count)
            .and_then(|words| {
                if words.len() == usize::from(count) {
                    Ok(words)
                } else {
                    Err(TransportError::ShortResponse {
                        expected: usize::from(count),
                        actual: words.len(),
                    })
                }
            });

        match result {
            Ok(words) => {
                debug!("read addr={} count={} regs={:?}", address, count, words);
                Ok(words)
            }
            Err(err) => {
                let context = format!("read addr={} count={}", address, count);
                Err(self.handle_failure(&mut link, err, &context))
            }
        }
    }

    /// Write `values` to consecutive holding registers starting at `address`
    pub fn write_block(&self, address: u16, values: &[u16]) -> TransportResult<()> {
        let mut link = self.lock();
        if !self.connect_locked(&mut link) {
            return Err(TransportError::NotConnected);
        }

        thread::sleep(INTER_FRAME_DELAY);
        match link.driver.write_registers(address, values) {
            Ok(()) => {
                debug!("write addr={} regs={:?}", address, values);
                Ok(())
            }
            Err(err) => {
                let context = format!("write addr={} regs={:?}", address, values);
                Err(self.handle_failure(&mut link, err, &context))
            }
        }
    }

    fn connect_locked(&self, link: &mut Link) -> bool {
        if link.connected {
            return true;
        }
        match link.driver.open() {
            Ok(()) => {
                link.connected = true;
                link.generation += 1;
                info!("Instrument link connected");
                self.events.emit(DeviceEvent::Connection(true));
                true
            }
            Err(err) => {
                warn!("Instrument link open failed: {}", err);
                self.events.emit(DeviceEvent::IoError(err.to_string()));
                false
            }
        }
    }

    /// Apply the failure policy and hand the error back to the caller
    fn handle_failure(&self, link: &mut Link, err: TransportError, context: &str) -> TransportError {
        self.events
            .emit(DeviceEvent::IoError(format!("{}: {}", context, err)));

        if !err.is_link_failure() {
            warn!("{} rejected by device: {}", context, err);
            return err;
        }

        error!("{} failed: {}", context, err);
        link.driver.close();
        link.connected = false;
        self.events.emit(DeviceEvent::Connection(false));

        if self.connect_locked(link) {
            info!("Instrument link re-established after failure");
        }
        err
    }
}
