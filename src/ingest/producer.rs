//! Producer side of the frame pipeline.
//!
//! `FrameProducer` sits behind the transport's write callback: every chunk
//! read from the camera goes through the boundary scanner, and each frame it
//! completes is moved into the shared queue.

use std::io;
use std::sync::Arc;

use super::scanner::{BoundaryScanner, ScannerStats};
use crate::queue::{Enqueued, FrameQueue};

/// Counters for one producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub chunks: u64,
    pub frames_queued: u64,
    pub frames_dropped: u64,
    pub scanner: ScannerStats,
}

/// Feeds transport chunks to a scanner and enqueues the completed frames.
///
/// Only the producer thread touches the scanner, so it needs no lock; the
/// queue is the one piece of shared state.
pub struct FrameProducer {
    scanner: BoundaryScanner,
    queue: Arc<FrameQueue>,
    chunks: u64,
    frames_queued: u64,
    frames_dropped: u64,
}

impl FrameProducer {
    pub fn new(queue: Arc<FrameQueue>) -> Self {
        Self::with_scanner(BoundaryScanner::new(), queue)
    }

    pub fn with_scanner(scanner: BoundaryScanner, queue: Arc<FrameQueue>) -> Self {
        Self {
            scanner,
            queue,
            chunks: 0,
            frames_queued: 0,
            frames_dropped: 0,
        }
    }

    /// Write callback body. Returns the number of bytes consumed, which is
    /// always the full chunk; anything less would abort the transfer.
    pub fn on_chunk(&mut self, chunk: &[u8]) -> usize {
        self.chunks += 1;
        for frame in self.scanner.feed(chunk) {
            match self.queue.enqueue(frame) {
                Enqueued::Queued => self.frames_queued += 1,
                Enqueued::Dropped => self.frames_dropped += 1,
            }
        }
        chunk.len()
    }

    /// End of stream: any partially captured frame is discarded.
    pub fn finish(&mut self) -> usize {
        self.scanner.finish()
    }

    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            chunks: self.chunks,
            frames_queued: self.frames_queued,
            frames_dropped: self.frames_dropped,
            scanner: self.scanner.stats(),
        }
    }
}

impl io::Write for FrameProducer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.on_chunk(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
