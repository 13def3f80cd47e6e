//! Frame statistics.

use std::fmt;

/// Outcome of validating one candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Frame decoded.
    Valid,
    /// Start or end marker mismatch.
    InvalidMarker,
    /// Markers matched but the checksum did not.
    ChecksumError,
    /// Candidate abandoned before all of its bytes arrived.
    Partial,
}

/// Monotonic frame counters.
///
/// Counters only grow; [`StreamStats::reset`] is the one way back to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    valid: u64,
    invalid_marker: u64,
    checksum_errors: u64,
    partial: u64,
    resync_bytes: u64,
}

impl StreamStats {
    /// Create empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one classification.
    pub fn record(&mut self, class: FrameClass) {
        let counter = match class {
            FrameClass::Valid => &mut self.valid,
            FrameClass::InvalidMarker => &mut self.invalid_marker,
            FrameClass::ChecksumError => &mut self.checksum_errors,
            FrameClass::Partial => &mut self.partial,
        };
        *counter = counter.saturating_add(1);
    }

    /// Count bytes discarded while hunting for a start marker.
    pub fn record_resync(&mut self, bytes: usize) {
        self.resync_bytes = self
            .resync_bytes
            .saturating_add(bytes as u64);
    }

    /// Valid frames.
    pub fn valid(&self) -> u64 {
        self.valid
    }

    /// Total classified frames.
    pub fn total(&self) -> u64 {
        self.valid + self.invalid_marker + self.checksum_errors + self.partial
    }

    /// Copy of the counters with derived percentages.
    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total();
        #[allow(clippy::cast_precision_loss)]
        let pct = |n: u64| {
            if total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / total as f64
            }
        };

        StatsSnapshot {
            valid: self.valid,
            invalid_marker: self.invalid_marker,
            checksum_errors: self.checksum_errors,
            partial: self.partial,
            resync_bytes: self.resync_bytes,
            total,
            valid_pct: pct(self.valid),
            invalid_marker_pct: pct(self.invalid_marker),
            checksum_error_pct: pct(self.checksum_errors),
            partial_pct: pct(self.partial),
        }
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Point-in-time view of [`StreamStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatsSnapshot {
    /// Valid frames.
    pub valid: u64,
    /// Invalid-marker frames.
    pub invalid_marker: u64,
    /// Checksum failures.
    pub checksum_errors: u64,
    /// Abandoned partial frames.
    pub partial: u64,
    /// Bytes skipped while resynchronising.
    pub resync_bytes: u64,
    /// Sum of the four frame counters.
    pub total: u64,
    /// Valid share of `total`, in percent.
    pub valid_pct: f64,
    /// Invalid-marker share of `total`, in percent.
    pub invalid_marker_pct: f64,
    /// Checksum-error share of `total`, in percent.
    pub checksum_error_pct: f64,
    /// Partial share of `total`, in percent.
    pub partial_pct: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Valid frames:     {:6} ({:5.1}%)",
            self.valid, self.valid_pct
        )?;
        writeln!(
            f,
            "Invalid markers:  {:6} ({:5.1}%)",
            self.invalid_marker, self.invalid_marker_pct
        )?;
        writeln!(
            f,
            "Checksum errors:  {:6} ({:5.1}%)",
            self.checksum_errors, self.checksum_error_pct
        )?;
        writeln!(
            f,
            "Partial frames:   {:6} ({:5.1}%)",
            self.partial, self.partial_pct
        )?;
        writeln!(f, "Resync bytes:     {:6}", self.resync_bytes)?;
        write!(f, "Total processed:  {:6}", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_has_zero_percentages() {
        let snap = StreamStats::new().snapshot();
        assert_eq!(snap.total, 0);
        assert!(snap.valid_pct.abs() < f64::EPSILON);
        assert!(snap.partial_pct.abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_and_percentages() {
        let mut stats = StreamStats::new();
        for _ in 0..6 {
            stats.record(FrameClass::Valid);
        }
        stats.record(FrameClass::InvalidMarker);
        stats.record(FrameClass::ChecksumError);
        stats.record(FrameClass::ChecksumError);
        stats.record(FrameClass::Partial);
        stats.record_resync(17);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 10);
        assert_eq!(snap.valid, 6);
        assert_eq!(snap.checksum_errors, 2);
        assert_eq!(snap.resync_bytes, 17);
        assert!((snap.valid_pct - 60.0).abs() < 1e-9);
        assert!((snap.checksum_error_pct - 20.0).abs() < 1e-9);
        assert!((snap.invalid_marker_pct - 10.0).abs() < 1e-9);
        assert!((snap.partial_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut stats = StreamStats::new();
        stats.record(FrameClass::Valid);
        stats.record_resync(3);
        stats.reset();
        assert_eq!(stats, StreamStats::default());
    }

    #[test]
    fn test_display_lists_every_counter() {
        let mut stats = StreamStats::new();
        stats.record(FrameClass::Valid);
        let text = stats
            .snapshot()
            .to_string();
        assert!(text.contains("Valid frames:"));
        assert!(text.contains("100.0%"));
        assert!(text.contains("Total processed:       1"));
    }
}
