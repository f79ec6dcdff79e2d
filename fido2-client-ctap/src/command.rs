//! CTAP2 command codes
//!
//! The first byte of every CBOR request payload selects the command.

use std::fmt;

/// CTAP 2.1 command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CtapCommand {
    /// MakeCredential (0x01)
    MakeCredential = 0x01,
    /// GetAssertion (0x02)
    GetAssertion = 0x02,
    /// GetInfo (0x04)
    GetInfo = 0x04,
    /// ClientPIN (0x06)
    ClientPin = 0x06,
    /// Reset (0x07)
    Reset = 0x07,
    /// GetNextAssertion (0x08)
    GetNextAssertion = 0x08,
    /// CredentialManagement (0x0a)
    CredentialManagement = 0x0a,
    /// Selection (0x0b)
    Selection = 0x0b,
}

impl CtapCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MakeCredential),
            0x02 => Some(Self::GetAssertion),
            0x04 => Some(Self::GetInfo),
            0x06 => Some(Self::ClientPin),
            0x07 => Some(Self::Reset),
            0x08 => Some(Self::GetNextAssertion),
            0x0a => Some(Self::CredentialManagement),
            0x0b => Some(Self::Selection),
            _ => None,
        }
    }
}

impl From<CtapCommand> for u8 {
    fn from(cmd: CtapCommand) -> Self {
        cmd.as_u8()
    }
}

impl fmt::Display for CtapCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MakeCredential => write!(f, "MakeCredential(0x01)"),
            Self::GetAssertion => write!(f, "GetAssertion(0x02)"),
            Self::GetInfo => write!(f, "GetInfo(0x04)"),
            Self::ClientPin => write!(f, "ClientPin(0x06)"),
            Self::Reset => write!(f, "Reset(0x07)"),
            Self::GetNextAssertion => write!(f, "GetNextAssertion(0x08)"),
            Self::CredentialManagement => write!(f, "CredentialManagement(0x0a)"),
            Self::Selection => write!(f, "Selection(0x0b)"),
        }
    }
}
