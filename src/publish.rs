//! Consumer side of the frame pipeline.
//!
//! A dedicated thread drains the frame queue and hands every frame, with the
//! fixed `FrameFormat`, to a `FrameSink`. The frame is released as soon as
//! the sink returns.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, FrameFormat};
use crate::queue::FrameQueue;

/// Default upper bound on one wait for a frame.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for published frames.
pub trait FrameSink: Send {
    fn publish(&mut self, frame: &Frame, format: &FrameFormat) -> Result<()>;
}

impl<F> FrameSink for F
where
    F: FnMut(&Frame, &FrameFormat) -> Result<()> + Send,
{
    fn publish(&mut self, frame: &Frame, format: &FrameFormat) -> Result<()> {
        self(frame, format)
    }
}

/// Sink that only logs, one line every `every` frames.
pub struct LogSink {
    every: u64,
    published: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            published: 0,
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(25)
    }
}

impl FrameSink for LogSink {
    fn publish(&mut self, frame: &Frame, format: &FrameFormat) -> Result<()> {
        self.published += 1;
        if self.published % self.every == 1 || self.every == 1 {
            log::info!(
                "frame {}: {} bytes, {}x{} {:?}",
                frame.seq(),
                frame.len(),
                format.width,
                format.height,
                format.compression
            );
        }
        Ok(())
    }
}

/// Sink writing each frame to `<dir>/frame_<seq>.jpg`.
///
/// The format descriptor is written once to `<dir>/format.json`.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn create(dir: impl AsRef<Path>, format: &FrameFormat) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create frame directory {}", dir.display()))?;
        let descriptor = serde_json::to_vec_pretty(format)?;
        std::fs::write(dir.join("format.json"), descriptor)
            .with_context(|| format!("write format descriptor in {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn frame_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("frame_{:08}.jpg", seq))
    }
}

impl FrameSink for DirectorySink {
    fn publish(&mut self, frame: &Frame, _format: &FrameFormat) -> Result<()> {
        let path = self.frame_path(frame.seq());
        std::fs::write(&path, frame.as_bytes())
            .with_context(|| format!("write frame {}", path.display()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub published: u64,
    pub failed: u64,
}

#[derive(Default)]
struct ConsumerCounters {
    published: AtomicU64,
    failed: AtomicU64,
}

impl ConsumerCounters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handle to a running consumer thread.
pub struct ConsumerHandle {
    stop: Arc<AtomicBool>,
    queue: Arc<FrameQueue>,
    counters: Arc<ConsumerCounters>,
    join: Option<JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn stats(&self) -> ConsumerStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Signal the thread, wake it if it is waiting, and join it.
    pub fn stop(mut self) -> Result<ConsumerStats> {
        self.shutdown()?;
        Ok(self.counters.snapshot())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.queue.close();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("frame consumer thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("{}", err);
        }
    }
}

/// Start the consumer thread for `queue`.
///
/// `poll_interval` bounds how long the thread waits for a frame before it
/// checks the stop flag again.
pub fn spawn_consumer<S>(
    queue: Arc<FrameQueue>,
    sink: S,
    format: FrameFormat,
    poll_interval: Duration,
) -> Result<ConsumerHandle>
where
    S: FrameSink + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(ConsumerCounters::default());

    let thread_stop = stop.clone();
    let thread_queue = queue.clone();
    let thread_counters = counters.clone();
    let join = std::thread::Builder::new()
        .name("frame-consumer".to_string())
        .spawn(move || {
            run_consumer(
                &thread_queue,
                sink,
                &format,
                poll_interval,
                &thread_stop,
                &thread_counters,
            )
        })
        .context("spawn frame consumer thread")?;

    Ok(ConsumerHandle {
        stop,
        queue,
        counters,
        join: Some(join),
    })
}

fn run_consumer<S: FrameSink>(
    queue: &FrameQueue,
    mut sink: S,
    format: &FrameFormat,
    poll_interval: Duration,
    stop: &AtomicBool,
    counters: &ConsumerCounters,
) {
    while !stop.load(Ordering::SeqCst) {
        let Some(frame) = queue.wait_dequeue(poll_interval) else {
            continue;
        };
        match sink.publish(&frame, format) {
            Ok(()) => {
                counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("failed to publish frame {}: {:#}", frame.seq(), err);
            }
        }
        drop(frame);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
