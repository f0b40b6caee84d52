//! Axis network camera driver core.
//!
//! Pulls the camera's continuous MJPEG stream over HTTP, cuts it into
//! discrete JPEG frames and hands them to a consumer through a small bounded
//! queue. Pan/tilt/zoom commands go out through a separate worker pool.
//!
//! # Data flow
//!
//! ```text
//! HTTP chunks -> BoundaryScanner -> FrameQueue (drop-on-full) -> FrameSink
//! ```
//!
//! The producer thread owns the scanner and never blocks on the consumer:
//! when the queue is full the newest frame is dropped. Each frame is owned by
//! exactly one stage at a time.
//!
//! # Module Structure
//!
//! - `frame`: `Frame` and the `FrameFormat` descriptor
//! - `ingest`: boundary scanner, producer adapter, HTTP transport
//! - `queue`: bounded frame queue
//! - `publish`: consumer thread and sinks
//! - `camera`: connection lifecycle and ordered pipeline teardown
//! - `ptz`: pan/tilt/zoom commands and dispatch
//! - `config`: JSON + environment configuration

pub mod camera;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod ptz;
pub mod publish;
pub mod queue;

pub use camera::{CameraDevice, CameraPipeline, LinkState, PipelineReport};
pub use config::CameraConfig;
pub use frame::{Compression, Frame, FrameFormat, PixelFormat};
pub use ingest::{BoundaryScanner, FrameProducer, ScanMode};
pub use publish::{spawn_consumer, ConsumerHandle, ConsumerStats, DirectorySink, FrameSink, LogSink};
pub use queue::{Enqueued, FrameQueue, QueueError, QueueStats, DEFAULT_QUEUE_CAPACITY};
