//! Start-marker scanner.
//!
//! The serial stream has no message boundaries and chunks arrive at arbitrary
//! offsets, so the marker is searched at every byte position.

use super::frame::FRAME_START;

const MARKER: [u8; 2] = FRAME_START.to_be_bytes();

/// Resumable search for the frame start marker.
///
/// The scanner never mutates the buffer. When the owner drains bytes from the
/// front it must call [`FrameScanner::consume`] so the resume point follows.
#[derive(Debug, Default, Clone)]
pub struct FrameScanner {
    resume_at: usize,
}

impl FrameScanner {
    /// Create a scanner positioned at the start of the buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the first start marker in `buf` at or after the resume point.
    ///
    /// On a miss the resume point moves to the last byte, which may be the
    /// first half of a marker completed by the next chunk.
    pub fn scan(&mut self, buf: &[u8]) -> Option<usize> {
        let from = self.resume_at.min(buf.len());
        match find_start_marker(&buf[from..]) {
            Some(pos) => {
                self.resume_at = from + pos;
                Some(from + pos)
            },
            None => {
                self.resume_at = buf.len().saturating_sub(1);
                None
            },
        }
    }

    /// Account for `n` bytes drained from the front of the buffer.
    pub fn consume(&mut self, n: usize) {
        self.resume_at = self.resume_at.saturating_sub(n);
    }

    /// Forget all progress (buffer cleared).
    pub fn reset(&mut self) {
        self.resume_at = 0;
    }

    /// Offset the next scan starts from.
    pub fn resume_at(&self) -> usize {
        self.resume_at
    }
}

/// Position of the first start marker in `buf`, checking every byte offset.
pub fn find_start_marker(buf: &[u8]) -> Option<usize> {
    buf.windows(MARKER.len())
        .position(|w| w == MARKER)
}

/// Whether `byte` could begin a start marker.
pub fn is_marker_prefix(byte: u8) -> bool {
    byte == MARKER[0]
}
