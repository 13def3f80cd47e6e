//! Cerelog X8 data frame.
//!
//! ## Frame Format (wire format version 2)
//!
//! ```text
//! +--------+-----+-----------+--------+----------------+-----+--------+
//! | Start  | Len | Timestamp | Status | 8 x 24-bit ch  | Sum |  End   |
//! +--------+-----+-----------+--------+----------------+-----+--------+
//! | 2 bytes| 1   | 4 bytes   | 3      | 24 bytes       | 1   | 2 bytes|
//! +--------+-----+-----------+--------+----------------+-----+--------+
//! | 0xABCD | 31  | opaque BE | opaque | two's compl BE | sum | 0xDCBA |
//! +--------+-----+-----------+--------+----------------+-----+--------+
//! ```
//!
//! The checksum is the 8-bit wrapping sum of bytes `[2, 34)`, i.e. the length
//! byte through the last sample byte.
//!
//! Earlier firmware revisions validated the checksum before the end marker and
//! skipped a single byte on checksum failure; some scripts also read the markers
//! little-endian. Only version 2 is accepted here.

use {
    crate::error::FrameError,
    byteorder::{BigEndian, ByteOrder},
};

/// Frame start marker.
pub const FRAME_START: u16 = 0xABCD;

/// Frame end marker.
pub const FRAME_END: u16 = 0xDCBA;

/// Total frame size in bytes.
pub const FRAME_SIZE: usize = 37;

/// Value of the length byte: timestamp (4) + sample block (27).
pub const FRAME_LENGTH: u8 = 31;

/// Number of sample channels.
pub const CHANNEL_COUNT: usize = 8;

/// Number of opaque status bytes leading the sample block.
pub const STATUS_LEN: usize = 3;

/// Size of the sample block (status + channels).
pub const SAMPLE_BLOCK_LEN: usize = STATUS_LEN + CHANNEL_COUNT * 3;

/// Offset of the length byte.
pub const OFFSET_LENGTH: usize = 2;
/// Offset of the timestamp.
pub const OFFSET_TIMESTAMP: usize = 3;
/// Offset of the status bytes (start of the sample block).
pub const OFFSET_STATUS: usize = 7;
/// Offset of the first channel sample.
pub const OFFSET_CHANNELS: usize = OFFSET_STATUS + STATUS_LEN;
/// Offset of the checksum byte.
pub const OFFSET_CHECKSUM: usize = OFFSET_STATUS + SAMPLE_BLOCK_LEN;
/// Offset of the end marker.
pub const OFFSET_END: usize = OFFSET_CHECKSUM + 1;

/// Largest 24-bit sample value.
pub const SAMPLE_MAX: i32 = (1 << 23) - 1;
/// Smallest 24-bit sample value.
pub const SAMPLE_MIN: i32 = -(1 << 23);

/// 8-bit wrapping sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Sign-extend a big-endian 24-bit two's complement value.
pub fn sign_extend_24(bytes: [u8; 3]) -> i32 {
    let pad = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    i32::from_be_bytes([pad, bytes[0], bytes[1], bytes[2]])
}

/// A validated data frame with raw sample counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Declared payload length (not re-validated).
    pub length: u8,
    /// Device timestamp. Boot-relative or Unix time depending on firmware.
    pub timestamp: u32,
    /// Opaque ADS1299 status bytes.
    pub status: [u8; STATUS_LEN],
    /// Sign-extended 24-bit channel counts.
    pub samples: [i32; CHANNEL_COUNT],
}

impl Frame {
    /// Create a frame with the standard length byte.
    pub fn new(timestamp: u32, status: [u8; STATUS_LEN], samples: [i32; CHANNEL_COUNT]) -> Self {
        Self {
            length: FRAME_LENGTH,
            timestamp,
            status,
            samples,
        }
    }

    /// Validate and decode a candidate frame starting at `window[0]`.
    ///
    /// Only the first [`FRAME_SIZE`] bytes are examined. Checks run in order:
    /// size, markers, checksum.
    pub fn parse(window: &[u8]) -> Result<Self, FrameError> {
        if window.len() < FRAME_SIZE {
            return Err(FrameError::Incomplete {
                needed: FRAME_SIZE - window.len(),
            });
        }
        let frame = &window[..FRAME_SIZE];

        let start = BigEndian::read_u16(&frame[0..2]);
        let end = BigEndian::read_u16(&frame[OFFSET_END..FRAME_SIZE]);
        if start != FRAME_START || end != FRAME_END {
            return Err(FrameError::InvalidMarker { start, end });
        }

        let expected = checksum(&frame[OFFSET_LENGTH..OFFSET_CHECKSUM]);
        let actual = frame[OFFSET_CHECKSUM];
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        let mut status = [0u8; STATUS_LEN];
        status.copy_from_slice(&frame[OFFSET_STATUS..OFFSET_CHANNELS]);

        let mut samples = [0i32; CHANNEL_COUNT];
        for (ch, sample) in samples
            .iter_mut()
            .enumerate()
        {
            let idx = OFFSET_CHANNELS + ch * 3;
            *sample = sign_extend_24([frame[idx], frame[idx + 1], frame[idx + 2]]);
        }

        Ok(Self {
            length: frame[OFFSET_LENGTH],
            timestamp: BigEndian::read_u32(&frame[OFFSET_TIMESTAMP..OFFSET_STATUS]),
            status,
            samples,
        })
    }

    /// Encode the frame. Samples are truncated to their low 24 bits.
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut buf = [0u8; FRAME_SIZE];
        BigEndian::write_u16(&mut buf[0..2], FRAME_START);
        buf[OFFSET_LENGTH] = self.length;
        BigEndian::write_u32(&mut buf[OFFSET_TIMESTAMP..OFFSET_STATUS], self.timestamp);
        buf[OFFSET_STATUS..OFFSET_CHANNELS].copy_from_slice(&self.status);
        for (ch, sample) in self
            .samples
            .iter()
            .enumerate()
        {
            let idx = OFFSET_CHANNELS + ch * 3;
            let be = sample.to_be_bytes();
            buf[idx..idx + 3].copy_from_slice(&be[1..4]);
        }
        buf[OFFSET_CHECKSUM] = checksum(&buf[OFFSET_LENGTH..OFFSET_CHECKSUM]);
        BigEndian::write_u16(&mut buf[OFFSET_END..FRAME_SIZE], FRAME_END);
        buf
    }

    /// Checksum byte this frame carries on the wire.
    pub fn checksum(&self) -> u8 {
        self.to_bytes()[OFFSET_CHECKSUM]
    }
}
