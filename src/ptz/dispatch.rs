//! Bounded worker pool for PTZ commands.
//!
//! Camera HTTP calls can take hundreds of milliseconds, so they run on a
//! fixed set of workers instead of the caller's thread. The job queue is
//! bounded and `submit` never waits: a full queue rejects the job.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use super::command::PtzCommand;
use super::transport::PtzTransport;

/// Why `submit` refused a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchError {
    Full,
    Closed,
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Full => write!(f, "ptz command queue is full"),
            DispatchError::Closed => write!(f, "ptz dispatcher is shut down"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
}

/// Commands that go out back to back on one worker.
type Job = Vec<PtzCommand>;

pub struct PtzDispatcher {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl PtzDispatcher {
    pub fn new(
        transport: Arc<dyn PtzTransport>,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(anyhow!("ptz dispatcher needs at least one worker"));
        }
        let (sender, receiver) = mpsc::sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = receiver.clone();
            let transport = transport.clone();
            let counters = counters.clone();
            let handle = std::thread::Builder::new()
                .name(format!("ptz-worker-{}", id))
                .spawn(move || run_worker(&receiver, transport.as_ref(), &counters))
                .context("spawn ptz worker")?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            counters,
        })
    }

    /// Queue a group of commands. They are sent in order by a single worker.
    pub fn submit(&self, commands: Vec<PtzCommand>) -> Result<(), DispatchError> {
        let sender = self.sender.as_ref().ok_or(DispatchError::Closed)?;
        sender.try_send(commands).map_err(|err| match err {
            TrySendError::Full(_) => DispatchError::Full,
            TrySendError::Disconnected(_) => DispatchError::Closed,
        })
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue, let the workers finish what was already accepted and
    /// join them.
    pub fn shutdown(&mut self) -> Result<DispatchStats> {
        self.sender.take();
        let mut panicked = 0;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(anyhow!("{} ptz worker(s) panicked", panicked));
        }
        Ok(self.stats())
    }
}

impl Drop for PtzDispatcher {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("{}", err);
        }
    }
}

fn run_worker(receiver: &Mutex<Receiver<Job>>, transport: &dyn PtzTransport, counters: &Counters) {
    loop {
        // Hold the lock only while receiving so other workers can take the
        // next job while this one talks to the camera.
        let job = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        let Ok(job) = job else {
            return;
        };
        for command in &job {
            match transport.send(command) {
                Ok(_) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    log::warn!("ptz command '{}' failed: {:#}", command.query_string(), err);
                }
            }
        }
    }
}
