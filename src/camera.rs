//! Camera connection and pipeline lifecycle.
//!
//! `CameraDevice` owns the producer thread: it opens the MJPEG source, pumps
//! chunks through a `FrameProducer` and records the link state. The queue is
//! shared with whoever consumes frames. `CameraPipeline` pairs a device with
//! a consumer thread and tears both down in order.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::CameraConfig;
use crate::frame::{Frame, FrameFormat};
use crate::ingest::{
    open_stream, pump, BoundaryScanner, FrameProducer, ProducerStats, PumpOutcome,
    StreamUnavailable,
};
use crate::publish::{spawn_consumer, ConsumerHandle, ConsumerStats, FrameSink};
use crate::queue::{FrameQueue, QueueError, QueueStats};

type StreamReader = Box<dyn Read + Send>;

/// Transport state of one camera connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Streaming,
    /// The camera closed the stream.
    Ended,
    /// Stopped on request.
    Stopped,
    /// Connect or read failure. No reconnect is attempted.
    Unavailable(String),
}

impl LinkState {
    /// The producer thread has exited (or is about to).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LinkState::Connecting | LinkState::Streaming)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Streaming => write!(f, "streaming"),
            LinkState::Ended => write!(f, "ended"),
            LinkState::Stopped => write!(f, "stopped"),
            LinkState::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

// ----------------------------------------------------------------------------
// CameraDevice
// ----------------------------------------------------------------------------

pub struct CameraDevice {
    source: String,
    queue: Arc<FrameQueue>,
    stop: Arc<AtomicBool>,
    link: Arc<Mutex<LinkState>>,
    producer: Option<JoinHandle<ProducerStats>>,
    producer_stats: Option<ProducerStats>,
}

impl CameraDevice {
    /// Connect to the camera's MJPEG endpoint on a new producer thread.
    ///
    /// Returns once the thread is running; connection failures show up as
    /// `LinkState::Unavailable`.
    pub fn connect(config: &CameraConfig) -> Result<Self> {
        let http = config.http_stream()?;
        let source = http.url.clone();
        Self::spawn(source, config, move || open_stream(&http))
    }

    /// Run the producer over an arbitrary byte source, e.g. a recorded
    /// stream.
    pub fn from_reader<R>(reader: R, config: &CameraConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn("reader".to_string(), config, move || {
            Ok(Box::new(reader) as StreamReader)
        })
    }

    fn spawn<F>(source: String, config: &CameraConfig, open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<StreamReader, StreamUnavailable> + Send + 'static,
    {
        let queue = Arc::new(FrameQueue::new(config.queue.capacity)?);
        let stop = Arc::new(AtomicBool::new(false));
        let link = Arc::new(Mutex::new(LinkState::Connecting));
        let producer = FrameProducer::with_scanner(
            BoundaryScanner::with_max_frame_bytes(config.scanner.max_frame_bytes),
            queue.clone(),
        );

        let thread_source = source.clone();
        let thread_stop = stop.clone();
        let thread_link = link.clone();
        let chunk_size = config.camera.chunk_size;
        let join = std::thread::Builder::new()
            .name("frame-producer".to_string())
            .spawn(move || {
                run_producer(
                    &thread_source,
                    open,
                    producer,
                    &thread_stop,
                    &thread_link,
                    chunk_size,
                )
            })
            .context("spawn frame producer thread")?;

        Ok(Self {
            source,
            queue,
            stop,
            link,
            producer: Some(join),
            producer_stats: None,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// True when at least one frame is queued.
    pub fn frames_waiting(&self) -> bool {
        self.queue.is_waiting()
    }

    pub fn dequeue(&self) -> Result<Frame, QueueError> {
        self.queue.dequeue()
    }

    pub fn link_state(&self) -> LinkState {
        lock(&self.link).clone()
    }

    pub fn is_running(&self) -> bool {
        self.producer
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// Producer counters, available once the producer thread was joined.
    pub fn producer_stats(&self) -> Option<ProducerStats> {
        self.producer_stats
    }

    /// Wait for the stream to end on its own.
    pub fn wait_for_end(&mut self) -> Result<LinkState> {
        self.join_producer()?;
        Ok(self.link_state())
    }

    /// Ask the producer to stop and wait for it.
    ///
    /// The flag is checked between chunks, so this can take up to one read
    /// timeout when the camera has stalled.
    pub fn stop(&mut self) -> Result<LinkState> {
        self.stop.store(true, Ordering::SeqCst);
        self.join_producer()?;
        Ok(self.link_state())
    }

    fn join_producer(&mut self) -> Result<()> {
        if let Some(join) = self.producer.take() {
            let stats = join
                .join()
                .map_err(|_| anyhow!("frame producer thread panicked"))?;
            self.producer_stats = Some(stats);
        }
        Ok(())
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("{}", err);
        }
    }
}

fn run_producer<F>(
    source: &str,
    open: F,
    mut producer: FrameProducer,
    stop: &AtomicBool,
    link: &Mutex<LinkState>,
    chunk_size: usize,
) -> ProducerStats
where
    F: FnOnce() -> Result<StreamReader, StreamUnavailable>,
{
    let mut reader = match open() {
        Ok(reader) => reader,
        Err(err) => {
            log::error!("{}", err);
            *lock(link) = LinkState::Unavailable(err.reason);
            return producer.stats();
        }
    };
    *lock(link) = LinkState::Streaming;
    log::info!("camera {}: streaming", source);

    let state = match pump(&mut reader, &mut producer, stop, chunk_size) {
        Ok(PumpOutcome::Ended) => {
            log::info!("camera {}: stream ended", source);
            LinkState::Ended
        }
        Ok(PumpOutcome::Stopped) => LinkState::Stopped,
        Err(_) if stop.load(Ordering::SeqCst) => LinkState::Stopped,
        Err(err) => {
            log::warn!("camera {}: stream lost: {:#}", source, err);
            LinkState::Unavailable(format!("{:#}", err))
        }
    };

    let partial = producer.finish();
    if partial > 0 {
        log::debug!("camera {}: discarded {} bytes of a partial frame", source, partial);
    }
    *lock(link) = state;
    producer.stats()
}

fn lock(link: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
    link.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// CameraPipeline
// ----------------------------------------------------------------------------

/// Final accounting of a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    pub link: LinkState,
    pub producer: ProducerStats,
    pub consumer: ConsumerStats,
    pub queue: QueueStats,
    /// Frames still queued at teardown, never published.
    pub discarded: usize,
}

/// A camera device plus the consumer thread publishing its frames.
pub struct CameraPipeline {
    // Field order is drop order: the producer stops before the consumer.
    device: CameraDevice,
    consumer: Option<ConsumerHandle>,
}

impl CameraPipeline {
    pub fn start<S>(
        device: CameraDevice,
        sink: S,
        format: FrameFormat,
        poll_interval: Duration,
    ) -> Result<Self>
    where
        S: FrameSink + 'static,
    {
        let consumer = spawn_consumer(device.queue().clone(), sink, format, poll_interval)?;
        Ok(Self {
            device,
            consumer: Some(consumer),
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn consumer_stats(&self) -> ConsumerStats {
        self.consumer
            .as_ref()
            .map(ConsumerHandle::stats)
            .unwrap_or_default()
    }

    /// Block until the producer thread exits without signalling it.
    pub fn wait_for_end(&mut self) -> Result<LinkState> {
        self.device.wait_for_end()
    }

    /// Wait until the consumer has taken every queued frame. Returns false
    /// on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.device.frames_waiting() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Stop the producer, then the consumer, then discard what is left in
    /// the queue.
    pub fn shutdown(mut self) -> Result<PipelineReport> {
        let link = self.device.stop()?;
        let consumer = match self.consumer.take() {
            Some(consumer) => consumer.stop()?,
            None => ConsumerStats::default(),
        };
        let discarded = self.device.queue().clear();
        if discarded > 0 {
            log::info!(
                "camera {}: discarded {} queued frames at shutdown",
                self.device.source(),
                discarded
            );
        }
        Ok(PipelineReport {
            link,
            producer: self.device.producer_stats().unwrap_or_default(),
            consumer,
            queue: self.device.queue().stats(),
            discarded,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(body);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn config(capacity: usize) -> CameraConfig {
        let mut config = CameraConfig::default();
        config.queue.capacity = capacity;
        config.camera.chunk_size = 7;
        config
    }

    /// Never returns data; each read sleeps briefly.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            buf[0] = 0x00;
            Ok(1)
        }
    }

    #[test]
    fn reader_device_queues_frames_and_ends() {
        let mut stream = b"--boundary\r\n\r\n".to_vec();
        stream.extend(jpeg(b"first"));
        stream.extend_from_slice(b"\r\n--boundary\r\n\r\n");
        stream.extend(jpeg(b"second"));

        let mut device = CameraDevice::from_reader(Cursor::new(stream), &config(5)).unwrap();
        assert_eq!(device.wait_for_end().unwrap(), LinkState::Ended);

        assert!(device.frames_waiting());
        assert_eq!(device.dequeue().unwrap().as_bytes(), jpeg(b"first").as_slice());
        assert_eq!(device.dequeue().unwrap().as_bytes(), jpeg(b"second").as_slice());
        assert_eq!(device.dequeue().unwrap_err(), QueueError::Empty);
        assert_eq!(device.producer_stats().unwrap().frames_queued, 2);
    }

    #[test]
    fn stop_interrupts_endless_stream() {
        let mut device = CameraDevice::from_reader(Stalled, &config(5)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(device.stop().unwrap(), LinkState::Stopped);
        assert!(!device.is_running());
    }

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::Streaming.to_string(), "streaming");
        assert_eq!(
            LinkState::Unavailable("timed out".to_string()).to_string(),
            "unavailable: timed out"
        );
        assert!(LinkState::Ended.is_terminal());
        assert!(!LinkState::Connecting.is_terminal());
    }

    #[test]
    fn pipeline_publishes_then_reports() {
        let mut stream = Vec::new();
        for i in 0..3u8 {
            stream.extend(jpeg(&[i; 10]));
        }
        let device = CameraDevice::from_reader(Cursor::new(stream), &config(8)).unwrap();
        let mut pipeline = CameraPipeline::start(
            device,
            |_frame: &Frame, _format: &FrameFormat| -> Result<()> { Ok(()) },
            FrameFormat::default(),
            Duration::from_millis(10),
        )
        .unwrap();

        assert_eq!(pipeline.wait_for_end().unwrap(), LinkState::Ended);
        assert!(pipeline.wait_idle(Duration::from_secs(5)));

        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.consumer_stats().published < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let report = pipeline.shutdown().unwrap();
        assert_eq!(report.link, LinkState::Ended);
        assert_eq!(report.producer.frames_queued, 3);
        assert_eq!(report.consumer.published, 3);
        assert_eq!(report.discarded, 0);
    }
}
