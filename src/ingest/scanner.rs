//! MJPEG frame boundary scanner.
//!
//! `BoundaryScanner` cuts JPEG images out of a Motion-JPEG byte stream. It
//! only looks at the SOI (`FF D8`) and EOI (`FF D9`) markers: multipart
//! headers, boundaries and anything else between images are skipped.
//!
//! The stream arrives in chunks of arbitrary size. A marker may be split
//! across two chunks, so a trailing `0xFF` is carried over in `pending_byte`
//! and resolved against the first byte of the next chunk. The frames emitted
//! for a stream never depend on how that stream was chunked.

use std::iter::FusedIterator;

use crate::frame::Frame;

/// JPEG Start-Of-Image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG End-Of-Image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Largest capture kept before it is abandoned as garbage.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

const MARKER_PREFIX: u8 = 0xFF;
const INITIAL_CAPTURE_CAPACITY: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// Looking for the next SOI marker.
    Seeking,
    /// Inside a frame, appending bytes until EOI.
    Capturing,
}

/// Counters for one scanner (one stream connection).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScannerStats {
    pub bytes_scanned: u64,
    pub frames_emitted: u64,
    pub captures_abandoned: u64,
}

/// Two-state SOI/EOI scanner. One instance per stream connection.
#[derive(Debug)]
pub struct BoundaryScanner {
    mode: ScanMode,
    buffer: Vec<u8>,
    /// Last byte of the previous chunk when it may start a marker.
    pending_byte: Option<u8>,
    max_frame_bytes: usize,
    capacity_hint: usize,
    next_seq: u64,
    stats: ScannerStats,
}

impl BoundaryScanner {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Scanner that abandons any capture growing past `max_frame_bytes`.
    ///
    /// The limit never goes below the size of an empty SOI+EOI image.
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        let max_frame_bytes = max_frame_bytes.max(SOI.len() + EOI.len());
        Self {
            mode: ScanMode::Seeking,
            buffer: Vec::new(),
            pending_byte: None,
            max_frame_bytes,
            capacity_hint: INITIAL_CAPTURE_CAPACITY.min(max_frame_bytes),
            next_seq: 0,
            stats: ScannerStats::default(),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn stats(&self) -> ScannerStats {
        self.stats
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Bytes held by the frame currently being captured.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Scan one chunk and yield the frames that complete inside it.
    ///
    /// Frames are produced lazily. Dropping the iterator before it is
    /// exhausted still scans the rest of the chunk, discarding any frames
    /// completed there, so the scanner is always left positioned after the
    /// whole chunk.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Frames<'a> {
        self.stats.bytes_scanned += chunk.len() as u64;
        Frames {
            scanner: self,
            chunk,
            pos: 0,
        }
    }

    /// Signal end of stream. A partial frame is discarded, never emitted.
    ///
    /// Returns the number of buffered bytes that were dropped.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        if self.mode == ScanMode::Capturing {
            log::debug!(
                "stream ended inside a frame; discarding {} buffered bytes",
                discarded
            );
        }
        self.reset();
        discarded
    }

    fn reset(&mut self) {
        self.buffer = Vec::new();
        self.mode = ScanMode::Seeking;
        self.pending_byte = None;
    }

    fn step(&mut self, chunk: &[u8], pos: &mut usize) -> Option<Frame> {
        while *pos < chunk.len() {
            match self.mode {
                ScanMode::Seeking => self.seek(chunk, pos),
                ScanMode::Capturing => {
                    if let Some(frame) = self.capture(chunk, pos) {
                        return Some(frame);
                    }
                }
            }
        }
        None
    }

    /// Advance past the next SOI, or to the end of the chunk.
    fn seek(&mut self, chunk: &[u8], pos: &mut usize) {
        while *pos < chunk.len() {
            let byte = chunk[*pos];
            *pos += 1;
            if self.pending_byte.take() == Some(MARKER_PREFIX) && byte == SOI[1] {
                self.begin_capture();
                return;
            }
            if byte == MARKER_PREFIX {
                self.pending_byte = Some(byte);
            }
        }
    }

    fn begin_capture(&mut self) {
        let mut buffer = Vec::with_capacity(self.capacity_hint);
        buffer.extend_from_slice(&SOI);
        self.buffer = buffer;
        self.mode = ScanMode::Capturing;
        self.pending_byte = None;
    }

    /// Append bytes up to and including the next EOI.
    fn capture(&mut self, chunk: &[u8], pos: &mut usize) -> Option<Frame> {
        let rest = &chunk[*pos..];
        let room = self.max_frame_bytes - self.buffer.len();

        let end = if self.pending_byte.take() == Some(MARKER_PREFIX) && rest.first() == Some(&EOI[1])
        {
            Some(1)
        } else {
            rest.windows(2)
                .position(|pair| pair == EOI)
                .map(|idx| idx + EOI.len())
        };

        match end {
            Some(take) if take <= room => {
                self.buffer.extend_from_slice(&rest[..take]);
                *pos += take;
                Some(self.complete())
            }
            _ if rest.len() > room => {
                // Resume seeking at the first byte past the limit.
                *pos += room;
                self.abandon();
                None
            }
            _ => {
                self.buffer.extend_from_slice(rest);
                *pos = chunk.len();
                if rest.last() == Some(&MARKER_PREFIX) {
                    self.pending_byte = Some(MARKER_PREFIX);
                }
                None
            }
        }
    }

    fn complete(&mut self) -> Frame {
        let data = std::mem::take(&mut self.buffer);
        self.mode = ScanMode::Seeking;
        self.pending_byte = None;
        self.capacity_hint = data.len();

        let frame = Frame::new(self.next_seq, data);
        self.next_seq += 1;
        self.stats.frames_emitted += 1;
        frame
    }

    fn abandon(&mut self) {
        log::debug!(
            "capture exceeded {} bytes without EOI; discarding partial frame",
            self.max_frame_bytes
        );
        self.stats.captures_abandoned += 1;
        self.reset();
    }
}

impl Default for BoundaryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames completed by one `BoundaryScanner::feed` call.
#[must_use = "frames completed in this chunk are discarded unless the iterator is consumed"]
pub struct Frames<'a> {
    scanner: &'a mut BoundaryScanner,
    chunk: &'a [u8],
    pos: usize,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.scanner.step(self.chunk, &mut self.pos)
    }
}

impl FusedIterator for Frames<'_> {}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_chunks(scanner: &mut BoundaryScanner, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(scanner.feed(chunk).map(Frame::into_bytes));
        }
        out
    }

    #[test]
    fn extracts_single_frame_and_skips_surrounding_bytes() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(
            &mut scanner,
            &[&[0x00, 0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x00]],
        );

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]]);
        assert_eq!(scanner.mode(), ScanMode::Seeking);
        assert_eq!(scanner.buffered_len(), 0);
    }

    #[test]
    fn detects_soi_split_across_chunks() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(&mut scanner, &[&[0x10, 0x20, 0xFF], &[0xD8, 0x33, 0xFF, 0xD9]]);

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x33, 0xFF, 0xD9]]);
    }

    #[test]
    fn detects_eoi_split_across_chunks() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(&mut scanner, &[&[0xFF, 0xD8, 0x44, 0xFF], &[0xD9, 0x00]]);

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x44, 0xFF, 0xD9]]);
        assert_eq!(scanner.mode(), ScanMode::Seeking);
    }

    #[test]
    fn pending_byte_not_followed_by_marker_is_plain_data() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(
            &mut scanner,
            &[&[0xFF, 0xD8, 0x01, 0xFF], &[0x02, 0xFF, 0xD9]],
        );

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x01, 0xFF, 0x02, 0xFF, 0xD9]]);
    }

    #[test]
    fn truncated_stream_emits_nothing() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(&mut scanner, &[&[0x00, 0xFF, 0xD8, 0x01, 0x02, 0x03]]);

        assert!(frames.is_empty());
        assert_eq!(scanner.mode(), ScanMode::Capturing);
        assert_eq!(scanner.finish(), 5);
        assert_eq!(scanner.mode(), ScanMode::Seeking);
        assert_eq!(scanner.stats().frames_emitted, 0);
    }

    #[test]
    fn stray_eoi_outside_capture_is_ignored() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(&mut scanner, &[&[0xFF, 0xD9, 0x00, 0xFF, 0xD9]]);

        assert!(frames.is_empty());
        assert_eq!(scanner.mode(), ScanMode::Seeking);
    }

    #[test]
    fn emits_every_frame_in_one_chunk_with_sequence_numbers() {
        let mut scanner = BoundaryScanner::new();
        let chunk = [
            0xFF, 0xD8, 0x01, 0xFF, 0xD9, 0x55, 0xFF, 0xD8, 0x02, 0xFF, 0xD9, 0xFF, 0xD8, 0xFF,
            0xD9,
        ];
        let frames: Vec<Frame> = scanner.feed(&chunk).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(Frame::seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(frames[2].as_bytes(), &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(scanner.stats().frames_emitted, 3);
        assert_eq!(scanner.stats().bytes_scanned, chunk.len() as u64);
    }

    #[test]
    fn repeated_marker_prefix_before_eoi() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(&mut scanner, &[&[0xFF, 0xD8, 0xFF, 0xFF], &[0xD9]]);

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0xFF, 0xFF, 0xD9]]);
    }

    #[test]
    fn soi_inside_capture_is_data() {
        let mut scanner = BoundaryScanner::new();
        let frames = scan_chunks(
            &mut scanner,
            &[&[0xFF, 0xD8, 0x01, 0xFF, 0xD8, 0x02, 0xFF, 0xD9]],
        );

        assert_eq!(
            frames,
            vec![vec![0xFF, 0xD8, 0x01, 0xFF, 0xD8, 0x02, 0xFF, 0xD9]]
        );
    }

    #[test]
    fn dropping_iterator_early_still_consumes_chunk() {
        let mut scanner = BoundaryScanner::new();
        let chunk = [0xFF, 0xD8, 0x01, 0xFF, 0xD9, 0xFF, 0xD8, 0x02];
        {
            let mut frames = scanner.feed(&chunk);
            assert!(frames.next().is_some());
        }

        assert_eq!(scanner.mode(), ScanMode::Capturing);
        let frames = scan_chunks(&mut scanner, &[&[0xFF, 0xD9]]);
        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x02, 0xFF, 0xD9]]);
    }

    #[test]
    fn oversized_capture_is_abandoned_and_scanning_resumes() {
        let mut scanner = BoundaryScanner::with_max_frame_bytes(6);
        let mut stream = vec![0xFF, 0xD8, 1, 2, 3, 4, 5, 6, 7];
        stream.extend_from_slice(&[0xFF, 0xD8, 0x09, 0xFF, 0xD9]);

        let frames = scan_chunks(&mut scanner, &[&stream]);

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x09, 0xFF, 0xD9]]);
        assert_eq!(scanner.stats().captures_abandoned, 1);
    }

    #[test]
    fn frame_exactly_at_limit_is_kept() {
        let mut scanner = BoundaryScanner::with_max_frame_bytes(6);
        let frames = scan_chunks(&mut scanner, &[&[0xFF, 0xD8, 0x01], &[0x02, 0xFF, 0xD9]]);

        assert_eq!(frames, vec![vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]]);
        assert_eq!(scanner.stats().captures_abandoned, 0);
    }

    #[test]
    fn byte_at_a_time_matches_whole_stream() {
        let stream = [
            0x00, 0xFF, 0xFF, 0xD8, 0xFF, 0x00, 0xFF, 0xFF, 0xD9, 0xFF, 0xD9, 0xFF, 0xFF, 0xD8,
            0x7F, 0xFF, 0xD9, 0xFF,
        ];
        let mut whole = BoundaryScanner::new();
        let expected = scan_chunks(&mut whole, &[&stream]);

        let mut bytewise = BoundaryScanner::new();
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();
        let actual = scan_chunks(&mut bytewise, &chunks);

        assert_eq!(expected.len(), 2);
        assert_eq!(actual, expected);
    }
}
