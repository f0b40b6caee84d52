//! Streaming transport for the camera's MJPEG endpoint.
//!
//! `open_stream` performs the HTTP request and hands back the response body
//! as a reader. `pump` drives a long-lived transfer: it reads chunks and
//! delivers each one to a write callback (`io::Write`), the same contract as
//! a streaming download callback. A callback that consumes fewer bytes than
//! it was offered aborts the transfer.
//!
//! No retry happens here. A failed connect or read is reported to the owning
//! connection, which decides what to do next.

use anyhow::{anyhow, Context, Result};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Read size for one transport callback.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct HttpStreamConfig {
    /// Full MJPEG URL, e.g. `http://192.168.0.90/axis-cgi/mjpg/video.cgi`.
    pub url: String,
    pub connect_timeout: Duration,
    /// Longest stall tolerated between two reads before the stream is
    /// considered unavailable.
    pub read_timeout: Duration,
}

impl Default for HttpStreamConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.0.90/axis-cgi/mjpg/video.cgi".to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// Terminal transport failure for one camera connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamUnavailable {
    pub url: String,
    pub reason: String,
}

impl StreamUnavailable {
    pub fn new(url: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for StreamUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "camera stream {} unavailable: {}", self.url, self.reason)
    }
}

impl std::error::Error for StreamUnavailable {}

/// Open the MJPEG endpoint and return the response body.
pub fn open_stream(config: &HttpStreamConfig) -> Result<Box<dyn Read + Send>, StreamUnavailable> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.read_timeout)
        .build();
    let response = agent
        .get(&config.url)
        .call()
        .map_err(|err| StreamUnavailable::new(&config.url, err))?;

    let content_type = response.header("Content-Type").unwrap_or("");
    if !content_type.to_lowercase().contains("multipart") {
        log::warn!(
            "HttpStream: {} answered with content type '{}', expected multipart MJPEG",
            config.url,
            content_type
        );
    }
    log::info!("HttpStream: connected to {}", config.url);
    Ok(response.into_reader())
}

/// Why a `pump` returned without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpOutcome {
    /// The remote side closed the stream.
    Ended,
    /// The stop flag was raised between two chunks.
    Stopped,
}

/// Copy `reader` into `writer` one chunk at a time until the stream ends or
/// `stop` is raised.
///
/// `stop` is checked before every read, never while a chunk is being
/// delivered, so the writer always sees whole chunks.
pub fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    stop: &AtomicBool,
    chunk_size: usize,
) -> Result<PumpOutcome>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(PumpOutcome::Stopped);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(PumpOutcome::Ended),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).context("read mjpeg chunk"),
        };
        let consumed = writer
            .write(&chunk[..read])
            .context("deliver mjpeg chunk")?;
        if consumed != read {
            return Err(anyhow!(
                "write callback consumed {} of {} bytes; aborting transfer",
                consumed,
                read
            ));
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
