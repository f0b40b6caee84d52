//! Frame containers.
//!
//! - `Frame`: one complete JPEG image (SOI..EOI) cut from the MJPEG stream.
//! - `FrameFormat`: fixed description of the frames published by a camera.
//!
//! A `Frame` is owned by exactly one stage at a time: the scanner builds it,
//! the queue holds it, the consumer takes it and drops it after publishing.
//! `Frame` has no `Clone` impl, so it cannot be duplicated on its way
//! through the pipeline.

use serde::Serialize;
use std::time::{Duration, Instant};

// ----------------------------------------------------------------------------
// Frame: one extracted JPEG image
// ----------------------------------------------------------------------------

/// One complete JPEG image, including its `FF D8` and `FF D9` markers.
#[derive(Debug)]
pub struct Frame {
    /// Index of this frame among the frames emitted on its connection.
    seq: u64,
    data: Vec<u8>,
    captured_at: Instant,
}

impl Frame {
    /// Wrap completed JPEG bytes. The scanner is the normal caller.
    pub fn new(seq: u64, data: Vec<u8>) -> Self {
        Self {
            seq,
            data,
            captured_at: Instant::now(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give up the frame and keep its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Time since the scanner completed this frame.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

// ----------------------------------------------------------------------------
// FrameFormat: publishing metadata
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Mono8,
    Rgb888,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Raw,
    Jpeg,
}

/// Format descriptor sent with every published frame.
///
/// Configured once at startup; it is never renegotiated per frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub pixel_format: PixelFormat,
    /// Frame divisor, kept at 1 for a live stream.
    pub fdiv: u32,
    pub compression: Compression,
}

impl FrameFormat {
    /// JPEG frames of the given geometry, 24-bit RGB once decoded.
    pub fn jpeg(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits_per_pixel: 24,
            pixel_format: PixelFormat::Rgb888,
            fdiv: 1,
            compression: Compression::Jpeg,
        }
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::jpeg(768, 576)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
