//! Baud-rate configuration codes understood by the X8 firmware.

use {
    crate::error::{Error, Result},
    std::fmt,
};

/// Device baud configuration code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum BaudCode {
    /// 9600 baud, the rate the board boots at.
    B9600 = 0x00,
    /// 19200 baud.
    B19200 = 0x01,
    /// 38400 baud.
    B38400 = 0x02,
    /// 57600 baud.
    B57600 = 0x03,
    /// 115200 baud.
    B115200 = 0x04,
    /// 230400 baud (highest rate macOS drivers handle reliably).
    B230400 = 0x05,
    /// 460800 baud.
    B460800 = 0x06,
    /// 921600 baud.
    B921600 = 0x07,
}

/// Code to rate mapping, in code order.
pub const BAUD_TABLE: [(BaudCode, u32); 8] = [
    (BaudCode::B9600, 9_600),
    (BaudCode::B19200, 19_200),
    (BaudCode::B38400, 38_400),
    (BaudCode::B57600, 57_600),
    (BaudCode::B115200, 115_200),
    (BaudCode::B230400, 230_400),
    (BaudCode::B460800, 460_800),
    (BaudCode::B921600, 921_600),
];

/// Rate the board listens on after reset.
pub const DEFAULT_BAUD: BaudCode = BaudCode::B9600;

/// Rate negotiated when the caller does not choose one.
pub const DEFAULT_TARGET: BaudCode = BaudCode::B115200;

impl BaudCode {
    /// Look up a configuration code.
    pub fn from_code(code: u8) -> Result<Self> {
        BAUD_TABLE
            .iter()
            .find(|(c, _)| *c as u8 == code)
            .map(|(c, _)| *c)
            .ok_or(Error::InvalidBaudCode(code))
    }

    /// Look up the code for a concrete bit rate.
    pub fn from_baud(baud: u32) -> Result<Self> {
        BAUD_TABLE
            .iter()
            .find(|(_, b)| *b == baud)
            .map(|(c, _)| *c)
            .ok_or(Error::UnsupportedBaud(baud))
    }

    /// Wire value of this code.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Bit rate selected by this code.
    #[must_use]
    pub fn baud(self) -> u32 {
        BAUD_TABLE[usize::from(self.code())].1
    }
}

impl TryFrom<u8> for BaudCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

impl fmt::Display for BaudCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {:#04x})", self.baud(), self.code())
    }
}
