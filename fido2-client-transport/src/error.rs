//! Transport layer error types

use std::fmt;

/// Transport layer result type
pub type Result<T> = std::result::Result<T, Error>;

/// Transport layer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Report shorter than the framing header or report size out of range
    InvalidReport,

    /// Continuation packet carries a different channel id
    InvalidChannel,

    /// Initialization packet carries an unknown command byte
    InvalidCommand,

    /// Continuation sequence index out of order
    InvalidSequence,

    /// Declared payload length exceeds the protocol maximum
    MessageTooLarge,

    /// Reassembly ended before the declared payload length was satisfied
    Fragmentation,

    /// No report arrived within the read timeout
    Timeout,

    /// The authenticator answered with a CTAPHID ERROR frame
    Device(ErrorCode),

    /// No matching HID device
    DeviceNotFound,

    /// I/O error from the underlying HID handle
    Io(String),
}

/// CTAPHID error codes carried in an ERROR frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    InvalidCmd = 0x01,
    InvalidPar = 0x02,
    InvalidLen = 0x03,
    InvalidSeq = 0x04,
    MsgTimeout = 0x05,
    ChannelBusy = 0x06,
    LockRequired = 0x0A,
    InvalidChannel = 0x0B,
    Other = 0x7F,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => ErrorCode::InvalidCmd,
            0x02 => ErrorCode::InvalidPar,
            0x03 => ErrorCode::InvalidLen,
            0x04 => ErrorCode::InvalidSeq,
            0x05 => ErrorCode::MsgTimeout,
            0x06 => ErrorCode::ChannelBusy,
            0x0A => ErrorCode::LockRequired,
            0x0B => ErrorCode::InvalidChannel,
            _ => ErrorCode::Other,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidReport => write!(f, "Invalid HID report"),
            Error::InvalidChannel => write!(f, "Channel id mismatch"),
            Error::InvalidCommand => write!(f, "Invalid CTAPHID command"),
            Error::InvalidSequence => write!(f, "Invalid continuation sequence"),
            Error::MessageTooLarge => write!(f, "Message exceeds maximum size"),
            Error::Fragmentation => write!(f, "Incomplete message reassembly"),
            Error::Timeout => write!(f, "Timeout waiting for report"),
            Error::Device(code) => write!(f, "CTAPHID error frame: 0x{:02X}", code.as_u8()),
            Error::DeviceNotFound => write!(f, "Device not found"),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
