//! Transport abstraction for the serial link to the board.
//!
//! The protocol layer only needs a byte pipe it can read, write, flush and
//! close, plus a way to open a fresh pipe at a given rate. Those two
//! capabilities are the [`Port`] and [`PortOpener`] traits.
//!
//! ```text
//! +------------------+     +------------------+
//! |    Negotiator    |     |  StreamSession   |
//! +--------+---------+     +--------+---------+
//!          |  open/reopen           |  read_available
//!          v                        v
//! +--------+---------+     +--------+---------+
//! |    PortOpener    | --> |    Port trait    |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +------------------------------------------+
//! |       NativePort (serialport crate)      |
//! +------------------------------------------+
//! ```
//!
//! A port keeps the rate it was opened with for its whole lifetime. Changing
//! the rate of an open handle is unreliable on some platforms, so the only way
//! to switch speed is to close the port and open a new one.

#[cfg(feature = "native")]
pub mod native;
#[cfg(test)]
pub(crate) mod sim;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::{Error, Result};

/// Serial port configuration (8 data bits, no parity, 1 stop bit, no flow control).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout. Kept short so callers can poll.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 9600,
            timeout: Duration::from_millis(10),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open byte pipe to the board.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Get the baud rate the port was opened with.
    fn baud_rate(&self) -> u32;

    /// Get the read timeout.
    fn timeout(&self) -> Duration;

    /// Discard bytes the OS has buffered on the input side.
    fn clear_input(&mut self) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Read whatever is available, waiting at most the port timeout.
    ///
    /// A timeout is reported as `Ok(0)` rather than an error.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write `buf` with a single write call and flush.
    ///
    /// Returns the number of bytes the transport accepted.
    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        let written = self.write(buf)?;
        self.flush()?;
        Ok(written)
    }
}

/// Capability to open a port at a given rate.
pub trait PortOpener {
    /// Port type produced by this opener.
    type Port: Port;

    /// Open a new port.
    fn open(&mut self, config: &SerialConfig) -> Result<Self::Port>;
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::{NativeOpener, NativePort};
