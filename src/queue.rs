//! Bounded frame queue shared by the producer and consumer threads.
//!
//! Backpressure is drop-on-full: when the consumer falls behind, the newest
//! frames are discarded. `enqueue` never blocks on capacity and never grows
//! memory past `capacity` frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Queue capacity used by the Axis driver.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// `dequeue` was called with nothing queued.
    Empty,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Empty => write!(f, "frame queue is empty"),
        }
    }
}

impl std::error::Error for QueueError {}

/// What `enqueue` did with a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queue was full; the frame was discarded.
    Dropped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: u64,
    pub dropped: u64,
    pub len: usize,
}

struct QueueState {
    items: VecDeque<Frame>,
    queued: u64,
    dropped: u64,
    /// Set by `close`; waiters stop blocking once it is true.
    closed: bool,
}

/// Capacity-limited FIFO of completed frames guarded by a single mutex.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    /// Mirror of `items.len()`, written only while the lock is held.
    size: AtomicUsize,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("frame queue capacity must be greater than zero"));
        }
        Ok(Self::with_capacity(capacity))
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                queued: 0,
                dropped: 0,
                closed: false,
            }),
            available: Condvar::new(),
            size: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort check for queued frames. Does not take the lock.
    pub fn is_waiting(&self) -> bool {
        self.len() > 0
    }

    /// Move `frame` into the queue, or discard it if the queue is full.
    ///
    /// The capacity check and the push happen under one lock acquisition.
    pub fn enqueue(&self, frame: Frame) -> Enqueued {
        let mut state = self.lock();
        if state.items.len() >= self.capacity {
            state.dropped += 1;
            drop(state);
            log::debug!("frame queue full; dropping frame {}", frame.seq());
            return Enqueued::Dropped;
        }
        state.items.push_back(frame);
        state.queued += 1;
        self.size.store(state.items.len(), Ordering::Release);
        drop(state);
        self.available.notify_one();
        Enqueued::Queued
    }

    /// Remove and return the oldest frame.
    pub fn dequeue(&self) -> Result<Frame, QueueError> {
        let mut state = self.lock();
        let frame = state.items.pop_front().ok_or(QueueError::Empty)?;
        self.size.store(state.items.len(), Ordering::Release);
        Ok(frame)
    }

    /// Wait up to `timeout` for a frame, then dequeue it.
    ///
    /// Returns `None` on timeout, or at once when the queue is closed and
    /// empty. The closed check and the wait share one lock acquisition.
    pub fn wait_dequeue(&self, timeout: Duration) -> Option<Frame> {
        let state = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.items.is_empty() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        let frame = state.items.pop_front()?;
        self.size.store(state.items.len(), Ordering::Release);
        Some(frame)
    }

    /// Mark the queue closed and wake every thread blocked in
    /// `wait_dequeue`.
    ///
    /// Queued frames can still be dequeued and `enqueue` keeps working;
    /// only waiting stops blocking.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop every queued frame. Returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.items.len();
        state.items.clear();
        self.size.store(0, Ordering::Release);
        discarded
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queued: state.queued,
            dropped: state.dropped,
            len: state.items.len(),
        }
    }

    // Critical sections never leave the state half-updated, so a panic on
    // another thread does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
