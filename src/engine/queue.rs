// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! FIFO of command batches consumed by the engine thread

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::command::ExecItem;
use super::error::EngineError;

/// Outcome of a timed wait on the queue
#[derive(Debug, PartialEq)]
pub enum QueueWait {
    /// A batch was dequeued
    Batch(Vec<ExecItem>),
    /// The deadline passed with nothing queued
    Deadline,
    /// The queue is closed and fully drained
    Closed,
}

type Batch = Vec<ExecItem>;

/// Multi-producer, single-consumer batch queue over an `mpsc` channel.
///
/// Closing drops the only sender. The receiver keeps handing out every batch
/// admitted before that and reports [`QueueWait::Closed`] once it is empty.
#[derive(Debug)]
pub struct CommandQueue {
    sender: Mutex<Option<Sender<Batch>>>,
    receiver: Mutex<Receiver<Batch>>,
    pending: AtomicUsize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<Batch>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receiver(&self) -> MutexGuard<'_, Receiver<Batch>> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit a batch. Fails once the queue is closed.
    pub fn push(&self, batch: Vec<ExecItem>) -> Result<(), EngineError> {
        let sender = self.sender();
        let tx = sender.as_ref().ok_or(EngineError::QueueClosed)?;
        // Count first so the consumer never sees a negative backlog
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(batch).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::QueueClosed);
        }
        Ok(())
    }

    /// Block until a batch is available, the queue is closed and empty, or
    /// `deadline` passes.
    pub fn pop_blocking_until(&self, deadline: Instant) -> QueueWait {
        let receiver = self.receiver();
        let timeout = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(timeout) {
            Ok(batch) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                QueueWait::Batch(batch)
            }
            Err(RecvTimeoutError::Timeout) => QueueWait::Deadline,
            Err(RecvTimeoutError::Disconnected) => QueueWait::Closed,
        }
    }

    pub fn try_pop(&self) -> Option<Vec<ExecItem>> {
        match self.receiver().try_recv() {
            Ok(batch) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(batch)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stop admitting batches and let the consumer drain
    pub fn close(&self) {
        self.sender().take();
    }

    /// Admit batches again after a close.
    ///
    /// Must not race a consumer that is still draining: batches left in the
    /// old channel are discarded.
    pub fn reopen(&self) {
        let mut sender = self.sender();
        if sender.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.receiver() = rx;
        self.pending.store(0, Ordering::SeqCst);
        *sender = Some(tx);
    }

    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FunctionId;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn home() -> Vec<ExecItem> {
        vec![ExecItem::trigger(FunctionId::MotorHome)]
    }

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::new();
        queue.push(home()).unwrap();
        queue.push(vec![ExecItem::target_temperature(37.0)]).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_pop(), Some(home()));
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(
            queue.pop_blocking_until(deadline),
            QueueWait::Batch(vec![ExecItem::target_temperature(37.0)])
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_deadline_expires() {
        let queue = CommandQueue::new();
        let start = Instant::now();
        let deadline = start + Duration::from_millis(30);
        assert_eq!(queue.pop_blocking_until(deadline), QueueWait::Deadline);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let queue = Arc::new(CommandQueue::new());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(home()).unwrap();
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(queue.pop_blocking_until(deadline), QueueWait::Batch(home()));
        handle.join().unwrap();
    }

    #[test]
    fn test_close_drains_before_reporting_closed() {
        let queue = CommandQueue::new();
        queue.push(home()).unwrap();
        queue.push(vec![ExecItem::incubation_timeout()]).unwrap();
        queue.close();
        assert!(queue.is_closed());

        assert!(matches!(queue.push(home()), Err(EngineError::QueueClosed)));
        assert_eq!(queue.len(), 2);

        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(queue.pop_blocking_until(deadline), QueueWait::Batch(home()));
        assert!(matches!(queue.pop_blocking_until(deadline), QueueWait::Batch(_)));
        assert_eq!(queue.pop_blocking_until(deadline), QueueWait::Closed);
        assert!(queue.is_empty());

        queue.reopen();
        assert!(!queue.is_closed());
        assert!(queue.push(home()).is_ok());
        assert_eq!(queue.try_pop(), Some(home()));
    }

    #[test]
    fn test_close_wakes_waiter() {
        let queue = Arc::new(CommandQueue::new());
        let closer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        let start = Instant::now();
        let deadline = start + Duration::from_secs(10);
        assert_eq!(queue.pop_blocking_until(deadline), QueueWait::Closed);
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
