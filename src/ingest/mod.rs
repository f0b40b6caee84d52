//! MJPEG ingestion.
//!
//! This module turns the camera's continuous MJPEG transfer into discrete
//! JPEG frames:
//! - `transport`: HTTP connection and the chunk pump (write-callback contract)
//! - `scanner`: SOI/EOI boundary scanner, chunk-boundary safe
//! - `producer`: write-callback adapter that enqueues completed frames
//!
//! The ingestion layer is responsible for:
//! - Recognizing frame boundaries regardless of how the stream is chunked
//! - Moving each completed frame into the bounded queue exactly once
//! - Returning the full chunk length to keep the transfer alive
//!
//! The ingestion layer MUST NOT:
//! - Decode or validate JPEG contents beyond the marker bytes
//! - Block the transfer when the queue is full (frames are dropped instead)
//! - Retry or reconnect a failed transfer

pub mod producer;
pub mod scanner;
pub mod transport;

pub use producer::{FrameProducer, ProducerStats};
pub use scanner::{BoundaryScanner, Frames, ScanMode, ScannerStats};
pub use transport::{open_stream, pump, HttpStreamConfig, PumpOutcome, StreamUnavailable};
