//! Cerelog X8 wire protocol.

pub mod baud;
pub mod frame;
pub mod handshake;
pub mod scanner;

// Re-export common types
pub use {
    baud::{BAUD_TABLE, BaudCode, DEFAULT_BAUD, DEFAULT_TARGET},
    frame::{CHANNEL_COUNT, FRAME_SIZE, Frame, checksum, sign_extend_24},
    handshake::{HANDSHAKE_SIZE, HandshakePacket, unix_timestamp},
    scanner::{FrameScanner, find_start_marker},
};
