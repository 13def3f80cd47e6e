//! In-memory X8 board for exercising the negotiator and session.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortOpener, SerialConfig},
        protocol::{Frame, HandshakePacket},
    },
    std::{
        io::{self, Read, Write},
        sync::{Arc, Mutex, MutexGuard},
        time::{Duration, Instant},
    },
};

/// Shared board state.
#[derive(Debug)]
pub(crate) struct Board {
    /// Rate the board UART currently runs at.
    pub baud: u32,
    /// Whether the firmware is emitting frames.
    pub streaming: bool,
    /// Switch rates when a valid handshake arrives.
    pub honor_handshake: bool,
    /// Cap on bytes accepted per write call.
    pub write_limit: Option<usize>,
    /// Rate whose open call fails.
    pub fail_open_at: Option<u32>,
    /// Garbage emitted before each frame.
    pub noise: Vec<u8>,
    /// Bytes queued for the next read at the default rate.
    pub reply: Vec<u8>,
    /// Rates the host opened, in order.
    pub opens: Vec<u32>,
    /// Number of close calls.
    pub closes: usize,
    /// Every byte the host wrote.
    pub written: Vec<u8>,
    /// Read calls made on any port.
    pub reads: usize,
    /// Open, write and close calls with the time they happened.
    pub events: Vec<(&'static str, Instant)>,
    /// Time each read blocks before returning.
    pub read_delay: Duration,
    /// Timestamp of the next emitted frame.
    pub next_timestamp: u32,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            baud: 9600,
            streaming: false,
            honor_handshake: true,
            write_limit: None,
            fail_open_at: None,
            noise: vec![0x00, 0x7F],
            reply: Vec::new(),
            opens: Vec::new(),
            closes: 0,
            written: Vec::new(),
            reads: 0,
            events: Vec::new(),
            read_delay: Duration::ZERO,
            next_timestamp: 1_700_000_000,
        }
    }
}

fn lock(board: &Arc<Mutex<Board>>) -> MutexGuard<'_, Board> {
    board
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Opener handing out ports wired to one [`Board`].
#[derive(Debug, Clone, Default)]
pub(crate) struct SimOpener {
    pub board: Arc<Mutex<Board>>,
}

impl SimOpener {
    pub fn new(board: Board) -> Self {
        Self {
            board: Arc::new(Mutex::new(board)),
        }
    }

    pub fn board(&self) -> MutexGuard<'_, Board> {
        lock(&self.board)
    }
}

impl PortOpener for SimOpener {
    type Port = SimPort;

    fn open(&mut self, config: &SerialConfig) -> Result<SimPort> {
        let mut board = lock(&self.board);
        board
            .opens
            .push(config.baud_rate);
        board
            .events
            .push(("open", Instant::now()));
        if board.fail_open_at == Some(config.baud_rate) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no such port",
            )));
        }
        if config.baud_rate == 9600 {
            // Opening at the boot rate resets the board
            board.baud = 9600;
            board.streaming = false;
        }
        Ok(SimPort {
            board: Arc::clone(&self.board),
            name: config
                .port_name
                .clone(),
            baud: config.baud_rate,
            timeout: config.timeout,
            open: true,
        })
    }
}

/// Port end of a simulated link.
#[derive(Debug)]
pub(crate) struct SimPort {
    board: Arc<Mutex<Board>>,
    name: String,
    baud: u32,
    timeout: Duration,
    open: bool,
}

impl Port for SimPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let mut board = lock(&self.board);
            board.closes += 1;
            board
                .events
                .push(("close", Instant::now()));
        }
        Ok(())
    }
}

impl Read for SimPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let delay = lock(&self.board).read_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut board = lock(&self.board);
        board.reads += 1;
        let chunk = if board.baud != self.baud {
            // Rate mismatch reads as line noise
            vec![0xF0, 0x0F]
        } else if !board.reply.is_empty() {
            std::mem::take(&mut board.reply)
        } else if board.streaming {
            let ts = board.next_timestamp;
            board.next_timestamp = ts.wrapping_add(1);
            let mut chunk = board.noise.clone();
            let frame = Frame::new(ts, [0xC0, 0, 0], [0, 1, -1, 2, -2, 3, -3, 4]);
            chunk.extend_from_slice(&frame.to_bytes());
            chunk
        } else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }
}

impl Write for SimPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let mut board = lock(&self.board);
        let n = board
            .write_limit
            .map_or(buf.len(), |limit| limit.min(buf.len()));
        board
            .written
            .extend_from_slice(&buf[..n]);
        board
            .events
            .push(("write", Instant::now()));

        if board.honor_handshake && board.baud == self.baud {
            if let Ok(packet) = HandshakePacket::parse(&buf[..n]) {
                if let Some(code) = packet.requested_baud() {
                    board.baud = code.baud();
                    board.streaming = true;
                }
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
