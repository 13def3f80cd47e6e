//! # cerelink
//!
//! Host-side protocol library for the Cerelog X8, an eight-channel ADS1299
//! biosignal board streaming over a USB serial link.
//!
//! The crate covers:
//!
//! - 37-byte data frame validation and resynchronisation
//! - 24-bit two's complement sample decoding and voltage scaling
//! - The 12-byte handshake packet that selects the board's baud rate
//! - The close-and-reopen negotiation that moves the link to that rate
//! - Per-session frame statistics
//!
//! ## Features
//!
//! - `native` (default): Serial port support via the `serialport` crate
//! - `serde`: Serialization support for records, statistics and configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use cerelink::{BaudCode, NativeOpener, Negotiator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut negotiator = Negotiator::new(NativeOpener, "/dev/ttyUSB0", BaudCode::B115200);
//!     let mut session = negotiator.run()?;
//!
//!     for _ in 0..100 {
//!         for record in session.poll()? {
//!             println!("{} {:?}", record.timestamp, record.volts);
//!         }
//!     }
//!
//!     print!("{}", session.close()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod decoder;
pub mod error;
pub mod negotiate;
pub mod port;
pub mod protocol;
pub mod session;
pub mod stats;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativeOpener, NativePort};
pub use {
    decoder::{FrameDecoder, Record, SampleScale},
    error::{Error, FrameError, Result},
    negotiate::{FailureReason, NegotiationState, NegotiationTimings, Negotiator},
    port::{Port, PortOpener, SerialConfig},
    protocol::{BaudCode, Frame, FrameScanner, HandshakePacket},
    session::StreamSession,
    stats::{FrameClass, StatsSnapshot, StreamStats},
};
