//! Buffered frame decoder.
//!
//! [`FrameDecoder`] owns the byte buffer accumulated from the transport and
//! turns it into [`Record`]s, resynchronising after garbage and feeding every
//! classification to its [`StreamStats`].
//!
//! ```rust
//! use cerelink::{Frame, FrameDecoder};
//!
//! let frame = Frame::new(42, [0xC0, 0, 0], [100, -100, 0, 0, 0, 0, 0, 0]);
//! let mut decoder = FrameDecoder::default();
//!
//! decoder.extend(&[0x00, 0x13]); // line noise
//! decoder.extend(&frame.to_bytes());
//!
//! let record = decoder.next_record().unwrap();
//! assert_eq!(record.timestamp, 42);
//! assert_eq!(record.counts[1], -100);
//! assert_eq!(decoder.stats().valid(), 1);
//! ```

use {
    crate::{
        error::{Error, FrameError, Result},
        protocol::{
            frame::{CHANNEL_COUNT, FRAME_SIZE, Frame, STATUS_LEN},
            scanner::{FrameScanner, is_marker_prefix},
        },
        stats::{FrameClass, StreamStats},
    },
    log::{debug, trace},
};

/// ADS1299 reference voltage used by the X8.
pub const DEFAULT_VREF: f64 = 4.5;

/// Programmable gain the X8 firmware configures.
pub const DEFAULT_GAIN: f64 = 24.0;

const FULL_SCALE: f64 = (1u32 << 24) as f64;

/// Count to volt transfer function.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SampleScale {
    /// Reference voltage in volts.
    pub vref: f64,
    /// Amplifier gain.
    pub gain: f64,
}

impl Default for SampleScale {
    fn default() -> Self {
        Self {
            vref: DEFAULT_VREF,
            gain: DEFAULT_GAIN,
        }
    }
}

impl SampleScale {
    /// Create a scale, rejecting non-positive or non-finite parameters.
    pub fn new(vref: f64, gain: f64) -> Result<Self> {
        let scale = Self { vref, gain };
        scale.validate()?;
        Ok(scale)
    }

    /// Check both parameters are finite and positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.vref.is_finite() && self.vref > 0.0) {
            return Err(Error::Config(format!("invalid vref: {}", self.vref)));
        }
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(Error::Config(format!("invalid gain: {}", self.gain)));
        }
        Ok(())
    }

    /// Volts represented by one count.
    pub fn volts_per_count(&self) -> f64 {
        (2.0 * self.vref / self.gain) / FULL_SCALE
    }

    /// Convert a raw 24-bit count to volts.
    pub fn to_volts(&self, count: i32) -> f64 {
        f64::from(count) * self.volts_per_count()
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Record {
    /// Opaque device timestamp; interpretation is left to the caller.
    pub timestamp: u32,
    /// Declared payload length.
    pub length: u8,
    /// Raw status bytes.
    pub status: [u8; STATUS_LEN],
    /// Raw channel counts.
    pub counts: [i32; CHANNEL_COUNT],
    /// Channel voltages.
    pub volts: [f64; CHANNEL_COUNT],
}

impl Record {
    /// Build a record from a validated frame.
    pub fn from_frame(frame: &Frame, scale: &SampleScale) -> Self {
        Self {
            timestamp: frame.timestamp,
            length: frame.length,
            status: frame.status,
            counts: frame.samples,
            volts: frame
                .samples
                .map(|c| scale.to_volts(c)),
        }
    }
}

/// Single-owner buffer turning a byte stream into records.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Start of unread bytes in `buf`.
    head: usize,
    scanner: FrameScanner,
    scale: SampleScale,
    stats: StreamStats,
}

impl FrameDecoder {
    /// Create a decoder with the given transfer function.
    pub fn new(scale: SampleScale) -> Self {
        Self {
            scale,
            ..Self::default()
        }
    }

    /// Append bytes read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf
            .extend_from_slice(bytes);
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.head
    }

    /// Transfer function applied to samples.
    pub fn scale(&self) -> &SampleScale {
        &self.scale
    }

    /// Frame counters.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Zero the frame counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Decode the next record, or `None` when more bytes are needed.
    pub fn next_record(&mut self) -> Option<Record> {
        loop {
            let Some(pos) = self
                .scanner
                .scan(&self.buf[self.head..])
            else {
                // Keep a trailing 0xAB: it may be half of a marker
                let keep = usize::from(
                    self.buf
                        .last()
                        .is_some_and(|&b| is_marker_prefix(b)),
                );
                self.discard_garbage(self.buffered() - keep);
                return None;
            };
            self.discard_garbage(pos);

            match Frame::parse(&self.buf[self.head..]) {
                Ok(frame) => {
                    self.stats
                        .record(FrameClass::Valid);
                    self.consume(FRAME_SIZE);
                    trace!("Decoded frame ts={}", frame.timestamp);
                    return Some(Record::from_frame(&frame, &self.scale));
                },
                Err(FrameError::Incomplete { .. }) => return None,
                Err(err) => {
                    debug!("Discarding candidate frame: {err}");
                    let class = match err {
                        FrameError::ChecksumMismatch { .. } => FrameClass::ChecksumError,
                        _ => FrameClass::InvalidMarker,
                    };
                    self.stats.record(class);
                    self.consume(err.skip_len());
                },
            }
        }
    }

    /// Decode every complete record currently buffered.
    pub fn drain_records(&mut self) -> Vec<Record> {
        std::iter::from_fn(|| self.next_record()).collect()
    }

    /// Discard buffered bytes, e.g. after the transport was reopened.
    ///
    /// A candidate frame still waiting for bytes is counted as partial.
    pub fn clear(&mut self) {
        if self.has_pending_candidate() {
            self.stats
                .record(FrameClass::Partial);
        }
        self.buf.clear();
        self.head = 0;
        self.scanner.reset();
    }

    /// Decode what remains and discard any trailing partial frame.
    pub fn finish(&mut self) -> Vec<Record> {
        let records = self.drain_records();
        self.clear();
        records
    }

    fn has_pending_candidate(&self) -> bool {
        self.buffered() >= 2
            && self
                .scanner
                .clone()
                .scan(&self.buf[self.head..])
                == Some(0)
    }

    fn discard_garbage(&mut self, n: usize) {
        if n > 0 {
            trace!("Skipping {n} bytes without a start marker");
            self.stats.record_resync(n);
            self.consume(n);
        }
    }

    /// Advance past `n` unread bytes, compacting once half the buffer is dead.
    fn consume(&mut self, n: usize) {
        let n = n.min(self.buffered());
        self.head += n;
        self.scanner.consume(n);

        if self.head == self.buf.len() {
            self.buf.clear();
            self.head = 0;
        } else if self.head > self.buf.len() / 2 {
            self.buf.drain(..self.head);
            self.head = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::protocol::frame::{OFFSET_CHECKSUM, SAMPLE_MAX, SAMPLE_MIN},
        proptest::prelude::*,
    };

    fn frame(ts: u32) -> Frame {
        Frame::new(ts, [0xC0, 0x00, 0x00], [ts as i32, -1, 0, 1, 2, 3, 4, 5])
    }

    #[test]
    fn test_large_capture_keeps_dead_prefix_bounded() {
        let mut capture = Vec::new();
        for ts in 0..20_000 {
            capture.push(0x55);
            capture.extend_from_slice(&frame(ts).to_bytes());
        }

        let mut decoder = FrameDecoder::default();
        decoder.extend(&capture);
        let mut seen = 0u32;
        while let Some(record) = decoder.next_record() {
            assert_eq!(record.timestamp, seen);
            seen += 1;
            assert!(decoder.head <= decoder.buf.len() / 2);
        }
        assert_eq!(seen, 20_000);
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(decoder.stats().snapshot().resync_bytes, 20_000);
    }

    #[test]
    fn test_compaction_preserves_split_frame() {
        let mut decoder = FrameDecoder::default();
        let bytes = frame(7).to_bytes();
        for ts in 0..4 {
            decoder.extend(&frame(ts).to_bytes());
        }
        decoder.extend(&bytes[..10]);
        assert_eq!(decoder.drain_records().len(), 4);
        assert_eq!(decoder.buffered(), 10);

        decoder.extend(&bytes[10..]);
        let record = decoder
            .next_record()
            .unwrap();
        assert_eq!(record.timestamp, 7);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_scale_default_transfer_function() {
        let scale = SampleScale::default();
        let expected = (2.0 * 4.5 / 24.0) / 16_777_216.0;
        assert!((scale.volts_per_count() - expected).abs() < 1e-18);
        assert!((scale.to_volts(SAMPLE_MAX) - 0.1875).abs() < 1e-6);
        assert!((scale.to_volts(SAMPLE_MIN) + 0.1875).abs() < 1e-9);
        assert!(scale.to_volts(0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale_validation() {
        assert!(SampleScale::new(4.5, 24.0).is_ok());
        assert!(matches!(SampleScale::new(4.5, 0.0), Err(Error::Config(_))));
        assert!(SampleScale::new(-1.0, 24.0).is_err());
        assert!(SampleScale::new(f64::NAN, 24.0).is_err());
    }

    #[test]
    fn test_custom_scale_is_applied() {
        let scale = SampleScale::new(2.4, 1.0).unwrap();
        let mut decoder = FrameDecoder::new(scale);
        decoder.extend(&frame(1000).to_bytes());
        let record = decoder.next_record().unwrap();
        assert!((record.volts[0] - 1000.0 * 4.8 / 16_777_216.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_frames_with_noise_between() {
        let mut data = frame(1).to_bytes().to_vec();
        data.extend_from_slice(&[0x13, 0x37, 0x00, 0xFF, 0xAB, 0x01, 0xCD, 0x42, 0x99, 0x10]);
        data.extend_from_slice(&frame(2).to_bytes());

        let mut decoder = FrameDecoder::default();
        decoder.extend(&data);
        let records = decoder.drain_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, 1);
        assert_eq!(records[1].timestamp, 2);
        assert_eq!(decoder.stats().snapshot().resync_bytes, 10);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut data = vec![0x00, 0xAB];
        data.extend_from_slice(&frame(7).to_bytes());
        data.extend_from_slice(&frame(8).to_bytes());

        let mut decoder = FrameDecoder::default();
        let mut records = Vec::new();
        for byte in data {
            decoder.extend(&[byte]);
            records.extend(decoder.drain_records());
        }
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].timestamp, 8);
    }

    #[test]
    fn test_incomplete_frame_is_kept() {
        let bytes = frame(3).to_bytes();
        let mut decoder = FrameDecoder::default();
        decoder.extend(&bytes[..20]);
        assert!(decoder.next_record().is_none());
        assert_eq!(decoder.buffered(), 20);
        assert_eq!(decoder.stats().total(), 0);

        decoder.extend(&bytes[20..]);
        assert_eq!(decoder.next_record().unwrap().timestamp, 3);
    }

    #[test]
    fn test_bad_end_marker_skips_one_byte() {
        let mut bad = frame(1).to_bytes();
        bad[36] = 0x00;
        let mut data = bad.to_vec();
        data.extend_from_slice(&frame(2).to_bytes());

        let mut decoder = FrameDecoder::default();
        decoder.extend(&data);
        let records = decoder.drain_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 2);

        let snap = decoder.stats().snapshot();
        assert_eq!(snap.invalid_marker, 1);
        assert_eq!(snap.valid, 1);
        // Rest of the broken frame is skipped as noise
        assert_eq!(snap.resync_bytes, 36);
    }

    #[test]
    fn test_checksum_error_skips_full_frame() {
        let mut bad = frame(1).to_bytes();
        bad[OFFSET_CHECKSUM] ^= 0xFF;
        let mut data = bad.to_vec();
        data.extend_from_slice(&frame(2).to_bytes());

        let mut decoder = FrameDecoder::default();
        decoder.extend(&data);
        let records = decoder.drain_records();
        assert_eq!(records.len(), 1);

        let snap = decoder.stats().snapshot();
        assert_eq!(snap.checksum_errors, 1);
        assert_eq!(snap.resync_bytes, 0);
    }

    #[test]
    fn test_no_marker_keeps_trailing_prefix_byte() {
        let mut decoder = FrameDecoder::default();
        decoder.extend(&[0x01, 0x02, 0x03, 0xAB]);
        assert!(decoder.next_record().is_none());
        assert_eq!(decoder.buffered(), 1);
        assert_eq!(decoder.stats().snapshot().resync_bytes, 3);
    }

    #[test]
    fn test_clear_counts_pending_partial() {
        let bytes = frame(1).to_bytes();
        let mut decoder = FrameDecoder::default();
        decoder.extend(&bytes[..10]);
        assert!(decoder.next_record().is_none());
        decoder.clear();
        assert_eq!(decoder.stats().snapshot().partial, 1);
        assert_eq!(decoder.buffered(), 0);

        // Nothing pending, nothing counted
        decoder.clear();
        assert_eq!(decoder.stats().snapshot().partial, 1);
    }

    #[test]
    fn test_finish_returns_remaining_records() {
        let mut data = frame(5).to_bytes().to_vec();
        data.extend_from_slice(&frame(6).to_bytes()[..30]);

        let mut decoder = FrameDecoder::default();
        decoder.extend(&data);
        let records = decoder.finish();
        assert_eq!(records.len(), 1);

        let snap = decoder.stats().snapshot();
        assert_eq!(snap.valid, 1);
        assert_eq!(snap.partial, 1);
    }

    #[test]
    fn test_reset_stats() {
        let mut decoder = FrameDecoder::default();
        decoder.extend(&frame(1).to_bytes());
        let _ = decoder.drain_records();
        decoder.reset_stats();
        assert_eq!(decoder.stats().total(), 0);
    }

    fn noise_without_marker() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..10).prop_map(|mut v| {
            // 0xAB never appears, so no false marker can form
            for b in &mut v {
                if *b == 0xAB {
                    *b = 0x00;
                }
            }
            v
        })
    }

    proptest! {
        #[test]
        fn prop_markerless_input_never_decodes(mut data in prop::collection::vec(any::<u8>(), 0..512)) {
            for b in &mut data {
                if *b == 0xAB {
                    *b = 0xAA;
                }
            }
            let mut decoder = FrameDecoder::default();
            decoder.extend(&data);
            prop_assert!(decoder.next_record().is_none());
            prop_assert_eq!(decoder.buffered(), 0);
            prop_assert_eq!(decoder.stats().total(), 0);
            prop_assert_eq!(decoder.stats().snapshot().resync_bytes, data.len() as u64);
        }

        #[test]
        fn prop_arbitrary_input_never_panics(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let mut decoder = FrameDecoder::default();
            for chunk in &chunks {
                decoder.extend(chunk);
                let _ = decoder.drain_records();
                prop_assert!(decoder.buffered() < FRAME_SIZE + 64);
            }
        }

        #[test]
        fn prop_frames_separated_by_noise_all_decode(
            a in any::<u32>(),
            b in any::<u32>(),
            noise in noise_without_marker(),
        ) {
            let mut data = Frame::new(a, [0; 3], [0; 8]).to_bytes().to_vec();
            data.extend_from_slice(&noise);
            data.extend_from_slice(&Frame::new(b, [0; 3], [0; 8]).to_bytes());

            let mut decoder = FrameDecoder::default();
            decoder.extend(&data);
            let records = decoder.drain_records();
            prop_assert_eq!(records.len(), 2);
            prop_assert_eq!(records[0].timestamp, a);
            prop_assert_eq!(records[1].timestamp, b);
        }
    }
}
