//! Streaming session over a negotiated port.

use {
    crate::{
        decoder::{FrameDecoder, Record},
        error::{Error, Result},
        port::Port,
        stats::{StatsSnapshot, StreamStats},
    },
    log::{debug, info},
    std::{fmt, mem},
};

/// Read chunk used while streaming.
const READ_CHUNK: usize = 512;

/// Exclusive owner of a port running at the negotiated rate.
///
/// Produced by [`Negotiator::run`](crate::Negotiator::run). The rate cannot be
/// changed from here; close the session and negotiate again instead.
pub struct StreamSession<P: Port> {
    port: P,
    decoder: FrameDecoder,
    pending: Vec<Record>,
    buf: Vec<u8>,
}

impl<P: Port> StreamSession<P> {
    pub(crate) fn new(port: P, decoder: FrameDecoder, pending: Vec<Record>) -> Self {
        Self {
            port,
            decoder,
            pending,
            buf: vec![0; READ_CHUNK],
        }
    }

    /// Port name.
    pub fn port_name(&self) -> &str {
        self.port
            .name()
    }

    /// Rate the port was opened at.
    pub fn baud_rate(&self) -> u32 {
        self.port
            .baud_rate()
    }

    /// Read what the port has and return every record completed by it.
    ///
    /// Records decoded during negotiation are returned by the first call.
    /// An empty vector means nothing complete arrived within the port timeout.
    pub fn poll(&mut self) -> Result<Vec<Record>> {
        let mut records = mem::take(&mut self.pending);
        let n = self
            .port
            .read_available(&mut self.buf)?;
        if n > 0 {
            self.decoder
                .extend(&self.buf[..n]);
            records.extend(
                self.decoder
                    .drain_records(),
            );
        }
        Ok(records)
    }

    /// Frame counters for this session.
    pub fn stats(&self) -> &StreamStats {
        self.decoder
            .stats()
    }

    /// Zero the frame counters.
    pub fn reset_stats(&mut self) {
        self.decoder
            .reset_stats();
    }

    /// Always rejected; the rate is fixed once streaming.
    pub fn reconfigure(&mut self, baud: u32) -> Result<()> {
        debug!("Refusing reconfiguration to {baud} on {}", self.port.name());
        Err(Error::ReconfigurationRejected(format!(
            "{} is streaming at {} baud; close the session and negotiate again",
            self.port.name(),
            self.port.baud_rate()
        )))
    }

    /// Close the port and return the final counters.
    pub fn close(mut self) -> Result<StatsSnapshot> {
        self.decoder
            .clear();
        let snapshot = self
            .decoder
            .stats()
            .snapshot();
        info!(
            "Closing {} after {} valid frame(s)",
            self.port.name(),
            snapshot.valid
        );
        self.port
            .close()?;
        Ok(snapshot)
    }

    /// Take the port and decoder apart.
    pub fn into_parts(self) -> (P, FrameDecoder) {
        (self.port, self.decoder)
    }
}

impl<P: Port> fmt::Debug for StreamSession<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("port_name", &self.port.name())
            .field("baud_rate", &self.port.baud_rate())
            .field("pending", &self.pending.len())
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
