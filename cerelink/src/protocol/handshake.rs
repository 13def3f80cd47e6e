//! Timestamp/configuration handshake sent to the board at the default rate.
//!
//! ## Packet Format
//!
//! ```text
//! +--------+------+-----------+------+-------+-----+--------+
//! | Start  | Type | Timestamp | Reg  | Value | Sum |  End   |
//! +--------+------+-----------+------+-------+-----+--------+
//! | 2 bytes| 1    | 4 bytes   | 1    | 1     | 1   | 2 bytes|
//! +--------+------+-----------+------+-------+-----+--------+
//! | 0xAABB | 0x02 | Unix, BE  | 0x01 | code  | sum | 0xCCDD |
//! +--------+------+-----------+------+-------+-----+--------+
//! ```
//!
//! The checksum covers bytes `[2, 9)` (message type through register value).
//! This span is not the data-frame span.

use {
    super::{baud::BaudCode, frame::checksum},
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder},
    log::warn,
    std::time::{SystemTime, UNIX_EPOCH},
};

/// Handshake start marker.
pub const HANDSHAKE_START: u16 = 0xAABB;

/// Handshake end marker.
pub const HANDSHAKE_END: u16 = 0xCCDD;

/// Total handshake size in bytes.
pub const HANDSHAKE_SIZE: usize = 12;

/// Message type carrying a timestamp and one register write.
pub const MSG_TIMESTAMP_CONFIG: u8 = 0x02;

/// Register address selecting the UART rate.
pub const REG_BAUD_SELECT: u8 = 0x01;

/// Clocks reading earlier than this are considered unset.
pub const MIN_PLAUSIBLE_TIMESTAMP: u32 = 1_600_000_000;

/// Timestamp sent when the host clock is implausible.
pub const FALLBACK_TIMESTAMP: u32 = 1_500_000_000;

const OFFSET_TYPE: usize = 2;
const OFFSET_TIMESTAMP: usize = 3;
const OFFSET_REG_ADDR: usize = 7;
const OFFSET_REG_VALUE: usize = 8;
const OFFSET_CHECKSUM: usize = 9;
const OFFSET_END: usize = 10;

/// Host to device handshake packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePacket {
    /// Message type.
    pub msg_type: u8,
    /// Unix timestamp handed to the device clock.
    pub timestamp: u32,
    /// Register address.
    pub reg_addr: u8,
    /// Register value.
    pub reg_value: u8,
}

impl HandshakePacket {
    /// Handshake requesting the device switch its UART to `code`.
    pub fn baud_select(code: BaudCode, timestamp: u32) -> Self {
        Self {
            msg_type: MSG_TIMESTAMP_CONFIG,
            timestamp,
            reg_addr: REG_BAUD_SELECT,
            reg_value: code.code(),
        }
    }

    /// Checksum over message type through register value.
    pub fn checksum(&self) -> u8 {
        let bytes = self.encode();
        checksum(&bytes[OFFSET_TYPE..OFFSET_CHECKSUM])
    }

    /// Encode the packet.
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut buf = [0u8; HANDSHAKE_SIZE];
        BigEndian::write_u16(&mut buf[0..OFFSET_TYPE], HANDSHAKE_START);
        buf[OFFSET_TYPE] = self.msg_type;
        BigEndian::write_u32(&mut buf[OFFSET_TIMESTAMP..OFFSET_REG_ADDR], self.timestamp);
        buf[OFFSET_REG_ADDR] = self.reg_addr;
        buf[OFFSET_REG_VALUE] = self.reg_value;
        buf[OFFSET_CHECKSUM] = checksum(&buf[OFFSET_TYPE..OFFSET_CHECKSUM]);
        BigEndian::write_u16(&mut buf[OFFSET_END..HANDSHAKE_SIZE], HANDSHAKE_END);
        buf
    }

    /// Parse and validate an encoded packet.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != HANDSHAKE_SIZE {
            return Err(Error::InvalidHandshake(format!(
                "expected {HANDSHAKE_SIZE} bytes, got {}",
                data.len()
            )));
        }

        let start = BigEndian::read_u16(&data[0..OFFSET_TYPE]);
        let end = BigEndian::read_u16(&data[OFFSET_END..HANDSHAKE_SIZE]);
        if start != HANDSHAKE_START || end != HANDSHAKE_END {
            return Err(Error::InvalidHandshake(format!(
                "bad markers {start:#06x}/{end:#06x}"
            )));
        }

        let expected = checksum(&data[OFFSET_TYPE..OFFSET_CHECKSUM]);
        if expected != data[OFFSET_CHECKSUM] {
            return Err(Error::InvalidHandshake(format!(
                "checksum {:#04x}, expected {expected:#04x}",
                data[OFFSET_CHECKSUM]
            )));
        }

        Ok(Self {
            msg_type: data[OFFSET_TYPE],
            timestamp: BigEndian::read_u32(&data[OFFSET_TIMESTAMP..OFFSET_REG_ADDR]),
            reg_addr: data[OFFSET_REG_ADDR],
            reg_value: data[OFFSET_REG_VALUE],
        })
    }

    /// Baud code requested by a baud-select packet.
    pub fn requested_baud(&self) -> Option<BaudCode> {
        if self.msg_type != MSG_TIMESTAMP_CONFIG || self.reg_addr != REG_BAUD_SELECT {
            return None;
        }
        BaudCode::from_code(self.reg_value).ok()
    }
}

/// Current Unix time in seconds, with the device fallback for unset clocks.
pub fn unix_timestamp() -> u32 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    plausible_timestamp(u32::try_from(secs).unwrap_or(u32::MAX))
}

fn plausible_timestamp(secs: u32) -> u32 {
    if secs < MIN_PLAUSIBLE_TIMESTAMP {
        warn!("System clock appears incorrect, using fallback timestamp");
        FALLBACK_TIMESTAMP
    } else {
        secs
    }
}

/// Hex dump in the `AA BB 02 ...` form used in logs.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
