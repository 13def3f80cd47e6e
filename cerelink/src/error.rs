//! Error types for cerelink.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for cerelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cerelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transport failure that is not an OS error (short write, closed port).
    #[error("Transport error: {0}")]
    Transport(String),

    /// No valid frame arrived within the observation window after reconnecting.
    #[error("Negotiation timeout: no valid frame within {window:?}")]
    NegotiationTimeout {
        /// Observation window that elapsed.
        window: Duration,
    },

    /// Reconfiguration attempted outside the handshake flow.
    #[error("Reconfiguration disabled outside handshake: {0}")]
    ReconfigurationRejected(String),

    /// A negotiation step was called out of order.
    #[error("Invalid negotiation state: {0}")]
    InvalidState(String),

    /// Baud configuration code not present in the device table.
    #[error("Invalid baud configuration code: {0:#04x}")]
    InvalidBaudCode(u8),

    /// Baud rate the device cannot be configured for.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    /// Malformed handshake packet.
    #[error("Invalid handshake packet: {0}")]
    InvalidHandshake(String),

    /// The embedding application requested cancellation.
    #[error("Operation interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error ends the current streaming pipeline.
    ///
    /// Frame-level errors are absorbed by the decoder; only transport failures
    /// and negotiation timeouts stop the pipeline.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_) | Self::Transport(_) | Self::NegotiationTimeout { .. } => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}

/// Classification of a candidate frame that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Not enough bytes buffered yet; wait for more.
    #[error("incomplete frame: {needed} more bytes needed")]
    Incomplete {
        /// Bytes still missing.
        needed: usize,
    },

    /// Start or end marker does not match.
    #[error("invalid marker: start {start:#06x}, end {end:#06x}")]
    InvalidMarker {
        /// Start marker as received.
        start: u16,
        /// End marker as received.
        end: u16,
    },

    /// Transmitted checksum differs from the computed one.
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum computed over the frame body.
        expected: u8,
        /// Checksum byte carried by the frame.
        actual: u8,
    },
}

impl FrameError {
    /// Number of bytes the scanner must drop to resynchronise after this error.
    #[must_use]
    pub fn skip_len(&self) -> usize {
        match self {
            Self::Incomplete { .. } => 0,
            Self::InvalidMarker { .. } => 1,
            Self::ChecksumMismatch { .. } => crate::protocol::frame::FRAME_SIZE,
        }
    }
}
