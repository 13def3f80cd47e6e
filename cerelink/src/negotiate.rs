//! Baud rate negotiation.
//!
//! The X8 boots talking at 9600 baud. To stream at a useful rate the host
//! opens the port at 9600, waits for the board to boot, sends one handshake
//! packet naming the target rate, lets the board switch over, then closes the
//! port and opens a fresh one at the target rate. Negotiation is complete once
//! a valid frame arrives on the new connection.
//!
//! ```text
//! Disconnected
//!     | connect            open at 9600, wait boot delay
//!     v
//! ConnectedAtDefault
//!     | send_handshake     one 12-byte write
//!     v
//! HandshakeSent
//!     | await_reconfig     wait settle delay, drain
//!     v
//! AwaitingDeviceReconfig
//!     | reconnect          close, pause, open at target
//!     v
//! ReconnectingAtTarget
//!     | confirm_streaming  first valid frame inside the window
//!     v
//! Streaming
//! ```
//!
//! Any failure moves the negotiator to [`NegotiationState::Failed`] and
//! releases the port. There is no automatic retry; call
//! [`Negotiator::reset`] and start over.

use {
    crate::{
        decoder::{FrameDecoder, SampleScale},
        error::{Error, Result},
        port::{Port, PortOpener, SerialConfig},
        protocol::{
            baud::{BaudCode, DEFAULT_BAUD},
            handshake::{HANDSHAKE_SIZE, HandshakePacket, hex_string, unix_timestamp},
        },
        session::StreamSession,
    },
    log::{debug, info, trace, warn},
    std::{
        fmt,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
};

/// Drained bytes kept for the trace log.
const DRAIN_LIMIT: usize = 4096;

/// Read chunk used while waiting for the first frame.
const CONFIRM_CHUNK: usize = 256;

/// Why a negotiation ended in [`NegotiationState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Open, read or write on the transport failed.
    Transport(String),
    /// No valid frame arrived at the target rate.
    NegotiationTimeout,
    /// Cancelled by the caller.
    Cancelled,
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::NegotiationTimeout { .. } => Self::NegotiationTimeout,
            Error::Interrupted => Self::Cancelled,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Negotiation progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// No port open.
    Disconnected,
    /// Port open at 9600 and the boot delay has elapsed.
    ConnectedAtDefault,
    /// Handshake written.
    HandshakeSent,
    /// Settle delay elapsed; the board should be on the new rate.
    AwaitingDeviceReconfig,
    /// Port reopened at the target rate, waiting for the first frame.
    ReconnectingAtTarget,
    /// A valid frame arrived at the target rate.
    Streaming,
    /// Negotiation stopped.
    Failed(FailureReason),
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::ConnectedAtDefault => f.write_str("connected at default rate"),
            Self::HandshakeSent => f.write_str("handshake sent"),
            Self::AwaitingDeviceReconfig => f.write_str("awaiting device reconfiguration"),
            Self::ReconnectingAtTarget => f.write_str("reconnected at target rate"),
            Self::Streaming => f.write_str("streaming"),
            Self::Failed(FailureReason::Transport(msg)) => write!(f, "failed ({msg})"),
            Self::Failed(FailureReason::NegotiationTimeout) => f.write_str("failed (timeout)"),
            Self::Failed(FailureReason::Cancelled) => f.write_str("failed (cancelled)"),
        }
    }
}

/// Delays used by the negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationTimings {
    /// Wait after opening at 9600 for the board to boot.
    pub boot_delay: Duration,
    /// Wait after the handshake for the board to switch rates.
    pub settle_delay: Duration,
    /// Pause between closing and reopening the port.
    pub reopen_pause: Duration,
    /// How long to wait for the first valid frame at the target rate.
    pub observation_window: Duration,
    /// Read timeout and sleep slice.
    pub poll_interval: Duration,
}

impl Default for NegotiationTimings {
    fn default() -> Self {
        Self {
            boot_delay: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
            reopen_pause: Duration::from_millis(150),
            observation_window: Duration::from_secs(4),
            poll_interval: Duration::from_millis(10),
        }
    }
}

type CancelCheck = Arc<dyn Fn() -> bool + Send + Sync>;
type Clock = Box<dyn Fn() -> u32 + Send>;

/// Drives one board from power-on to streaming.
pub struct Negotiator<O: PortOpener> {
    opener: O,
    port_name: String,
    target: BaudCode,
    timings: NegotiationTimings,
    scale: SampleScale,
    clock: Clock,
    cancelled: CancelCheck,
    state: NegotiationState,
    port: Option<O::Port>,
    handshake: Option<HandshakePacket>,
}

impl<O: PortOpener> Negotiator<O> {
    /// Create a negotiator for `port_name` aiming at `target`.
    pub fn new(opener: O, port_name: impl Into<String>, target: BaudCode) -> Self {
        Self {
            opener,
            port_name: port_name.into(),
            target,
            timings: NegotiationTimings::default(),
            scale: SampleScale::default(),
            clock: Box::new(unix_timestamp),
            cancelled: Arc::new(crate::is_interrupted_requested),
            state: NegotiationState::Disconnected,
            port: None,
            handshake: None,
        }
    }

    /// Override the delays.
    #[must_use]
    pub fn with_timings(mut self, timings: NegotiationTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Set the transfer function handed to the stream session.
    #[must_use]
    pub fn with_scale(mut self, scale: SampleScale) -> Self {
        self.scale = scale;
        self
    }

    /// Replace the wall clock used for the handshake timestamp.
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> u32 + Send + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the cancellation check (defaults to the global interrupt checker).
    #[must_use]
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancelled = Arc::new(check);
        self
    }

    /// Current state.
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Target rate.
    pub fn target(&self) -> BaudCode {
        self.target
    }

    /// Port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Delays in use.
    pub fn timings(&self) -> &NegotiationTimings {
        &self.timings
    }

    /// Handshake written by the last [`send_handshake`](Self::send_handshake).
    pub fn last_handshake(&self) -> Option<&HandshakePacket> {
        self.handshake
            .as_ref()
    }

    /// Run every step in order and hand over the streaming session.
    pub fn run(&mut self) -> Result<StreamSession<O::Port>> {
        self.connect()?;
        self.send_handshake()?;
        self.await_reconfig()?;
        self.reconnect()?;
        self.confirm_streaming()
    }

    /// Open the port at 9600 and wait for the board to boot.
    pub fn connect(&mut self) -> Result<()> {
        self.require(&NegotiationState::Disconnected, "connect")?;
        let result = self.try_connect();
        self.finish_step(result)
    }

    fn try_connect(&mut self) -> Result<()> {
        self.check_cancelled()?;
        info!(
            "Connecting to {} at {} baud",
            self.port_name,
            DEFAULT_BAUD.baud()
        );
        let port = self.open_at(DEFAULT_BAUD)?;
        self.port = Some(port);

        debug!("Waiting {:?} for board boot", self.timings.boot_delay);
        self.wait(self.timings.boot_delay)?;
        self.transition(NegotiationState::ConnectedAtDefault);
        Ok(())
    }

    /// Write the baud select handshake.
    ///
    /// This is the only path that reconfigures the board. Calling it from any
    /// state other than [`NegotiationState::ConnectedAtDefault`] is rejected
    /// without touching the port.
    pub fn send_handshake(&mut self) -> Result<HandshakePacket> {
        if self.state != NegotiationState::ConnectedAtDefault {
            return Err(Error::ReconfigurationRejected(format!(
                "handshake requires state '{}', current state is '{}'",
                NegotiationState::ConnectedAtDefault,
                self.state
            )));
        }
        let result = self.try_send_handshake();
        self.finish_step(result)
    }

    fn try_send_handshake(&mut self) -> Result<HandshakePacket> {
        self.check_cancelled()?;
        let packet = HandshakePacket::baud_select(self.target, (self.clock)());
        let bytes = packet.encode();

        let port = self.port_mut()?;
        port.clear_input()?;
        info!("Sending handshake: {}", hex_string(&bytes));
        let written = port.write_bytes(&bytes)?;
        if written != HANDSHAKE_SIZE {
            return Err(Error::Transport(format!(
                "short handshake write: {written} of {HANDSHAKE_SIZE} bytes"
            )));
        }

        debug!(
            "Requested {} at timestamp {}",
            self.target, packet.timestamp
        );
        self.handshake = Some(packet);
        self.transition(NegotiationState::HandshakeSent);
        Ok(packet)
    }

    /// Give the board time to switch and drain what it sent meanwhile.
    pub fn await_reconfig(&mut self) -> Result<()> {
        self.require(&NegotiationState::HandshakeSent, "await_reconfig")?;
        let result = self.try_await_reconfig();
        self.finish_step(result)
    }

    fn try_await_reconfig(&mut self) -> Result<()> {
        debug!(
            "Waiting {:?} for board to switch rates",
            self.timings.settle_delay
        );
        self.wait(self.timings.settle_delay)?;

        // Bounded by one poll interval so a chattering line cannot stall us
        let deadline = Instant::now() + self.timings.poll_interval;
        let mut kept = Vec::new();
        let mut total = 0usize;
        let mut buf = [0u8; 64];
        while Instant::now() < deadline {
            self.check_cancelled()?;
            let n = self
                .port_mut()?
                .read_available(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n;
            let room = DRAIN_LIMIT.saturating_sub(kept.len());
            kept.extend_from_slice(&buf[..n.min(room)]);
        }
        if total > 0 {
            // Anything here was sent before the switch or is misframed
            debug!(
                "Drained {} byte(s) at {} baud",
                total,
                DEFAULT_BAUD.baud()
            );
            trace!("Drained: {}", hex_string(&kept));
        }

        self.transition(NegotiationState::AwaitingDeviceReconfig);
        Ok(())
    }

    /// Close the port and open a fresh one at the target rate.
    pub fn reconnect(&mut self) -> Result<()> {
        self.require(&NegotiationState::AwaitingDeviceReconfig, "reconnect")?;
        let result = self.try_reconnect();
        self.finish_step(result)
    }

    fn try_reconnect(&mut self) -> Result<()> {
        self.release_port();
        self.wait(self.timings.reopen_pause)?;

        info!(
            "Reconnecting to {} at {} baud",
            self.port_name,
            self.target.baud()
        );
        let port = self.open_at(self.target)?;
        self.port = Some(port);
        self.transition(NegotiationState::ReconnectingAtTarget);
        Ok(())
    }

    /// Wait for the first valid frame at the target rate.
    pub fn confirm_streaming(&mut self) -> Result<StreamSession<O::Port>> {
        self.require(&NegotiationState::ReconnectingAtTarget, "confirm_streaming")?;
        let result = self.try_confirm_streaming();
        self.finish_step(result)
    }

    fn try_confirm_streaming(&mut self) -> Result<StreamSession<O::Port>> {
        let window = self.timings.observation_window;
        let mut decoder = FrameDecoder::new(self.scale);
        let mut buf = [0u8; CONFIRM_CHUNK];
        let start = Instant::now();

        self.port_mut()?
            .clear_input()?;

        let first = loop {
            self.check_cancelled()?;
            if start.elapsed() >= window {
                warn!(
                    "No valid frame at {} baud within {:?}",
                    self.target.baud(),
                    window
                );
                return Err(Error::NegotiationTimeout { window });
            }

            let n = self
                .port_mut()?
                .read_available(&mut buf)?;
            if n == 0 {
                thread::sleep(self.timings.poll_interval);
                continue;
            }
            decoder.extend(&buf[..n]);
            if let Some(record) = decoder.next_record() {
                break record;
            }
        };

        info!(
            "Streaming at {} baud after {:?}",
            self.target.baud(),
            start.elapsed()
        );
        let mut pending = vec![first];
        pending.extend(decoder.drain_records());

        let port = self
            .port
            .take()
            .ok_or_else(|| Error::Transport("port not open".to_string()))?;
        self.transition(NegotiationState::Streaming);
        Ok(StreamSession::new(port, decoder, pending))
    }

    /// Abandon negotiation and release the port.
    pub fn cancel(&mut self) {
        if !matches!(self.state, NegotiationState::Failed(_)) {
            info!("Negotiation cancelled in state '{}'", self.state);
        }
        self.release_port();
        self.state = NegotiationState::Failed(FailureReason::Cancelled);
    }

    /// Release the port and return to [`NegotiationState::Disconnected`].
    pub fn reset(&mut self) {
        self.release_port();
        self.handshake = None;
        self.state = NegotiationState::Disconnected;
    }

    fn open_at(&mut self, code: BaudCode) -> Result<O::Port> {
        let config = SerialConfig::new(&self.port_name, code.baud())
            .with_timeout(self.timings.poll_interval);
        let port = self
            .opener
            .open(&config)?;
        debug!(
            "Opened {} at {} baud (read timeout {:?})",
            port.name(),
            port.baud_rate(),
            port.timeout()
        );
        Ok(port)
    }

    fn port_mut(&mut self) -> Result<&mut O::Port> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Transport("port not open".to_string()))
    }

    fn release_port(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.close() {
                debug!("Error closing {}: {e}", self.port_name);
            }
        }
    }

    fn require(&self, expected: &NegotiationState, step: &str) -> Result<()> {
        if &self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{step} requires state '{expected}', current state is '{}'",
                self.state
            )))
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        debug!("Negotiation: {} -> {}", self.state, next);
        self.state = next;
    }

    fn finish_step<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            warn!("Negotiation failed in state '{}': {e}", self.state);
            self.release_port();
            self.state = NegotiationState::Failed(FailureReason::from(e));
        }
        result
    }

    fn check_cancelled(&self) -> Result<()> {
        if (self.cancelled)() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep in poll-interval slices, checking for cancellation.
    fn wait(&self, duration: Duration) -> Result<()> {
        let slice = self
            .timings
            .poll_interval
            .max(Duration::from_millis(1));
        let deadline = Instant::now() + duration;
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}

impl<O: PortOpener> fmt::Debug for Negotiator<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("port_name", &self.port_name)
            .field("target", &self.target)
            .field("timings", &self.timings)
            .field("state", &self.state)
            .field("port_open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl<O: PortOpener> Drop for Negotiator<O> {
    fn drop(&mut self) {
        self.release_port();
    }
}
