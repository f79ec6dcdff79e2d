//! CTAPHID message framing
//!
//! Fragments a logical CTAP message into fixed-size HID reports and
//! reassembles inbound reports into a complete message.
//!
//! Report format:
//! - Initialization packet: CID(4) + CMD(1, high bit set) + BCNT(2) + DATA
//! - Continuation packet: CID(4) + SEQ(1) + DATA
//!
//! The report size is a property of the transport instance, discovered when
//! the device is opened. All framing math derives from it.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb-hid-framing>

use crate::error::{Error, Result};

/// Report size used by every known USB HID authenticator
pub const DEFAULT_REPORT_SIZE: usize = 64;

/// Smallest report that still fits an initialization header plus one byte
pub const MIN_REPORT_SIZE: usize = 8;

/// Maximum CTAP message size (7609 bytes)
pub const MAX_MESSAGE_SIZE: usize = 7609;

/// Broadcast channel id (used for INIT)
pub const BROADCAST_CID: u32 = 0xFFFF_FFFF;

/// Initialization packet header: CID(4) + CMD(1) + BCNT(2)
const INIT_HEADER: usize = 7;

/// Continuation packet header: CID(4) + SEQ(1)
const CONT_HEADER: usize = 5;

/// CTAPHID commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Transaction that echoes the data back
    Ping = 0x01,

    /// Encapsulated CTAP1/U2F message
    Msg = 0x03,

    /// Place an exclusive lock for one channel
    Lock = 0x04,

    /// Allocate a new CID or synchronize a channel
    Init = 0x06,

    /// Request visual/audible identification from the authenticator
    Wink = 0x08,

    /// Encapsulated CTAP2 CBOR message
    Cbor = 0x10,

    /// Cancel any outstanding request on the given CID
    Cancel = 0x11,

    /// The request is still being processed
    Keepalive = 0x3B,

    /// Error response message
    Error = 0x3F,
}

impl Cmd {
    /// Convert from a command byte, masking off the TYPE bit
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x7F {
            0x01 => Some(Cmd::Ping),
            0x03 => Some(Cmd::Msg),
            0x04 => Some(Cmd::Lock),
            0x06 => Some(Cmd::Init),
            0x08 => Some(Cmd::Wink),
            0x10 => Some(Cmd::Cbor),
            0x11 => Some(Cmd::Cancel),
            0x3B => Some(Cmd::Keepalive),
            0x3F => Some(Cmd::Error),
            _ => None,
        }
    }

    /// Command byte with the TYPE bit set (initialization packet form)
    pub fn to_u8_init(self) -> u8 {
        (self as u8) | 0x80
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A single HID report, exactly one transport report size long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Wrap a raw report read from the device
    pub fn from_report(report: &[u8]) -> Result<Self> {
        if report.len() < MIN_REPORT_SIZE {
            return Err(Error::InvalidReport);
        }
        Ok(Self {
            data: report.to_vec(),
        })
    }

    /// Raw report bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Channel id
    pub fn cid(&self) -> u32 {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// Whether this is an initialization packet (TYPE bit set)
    pub fn is_init(&self) -> bool {
        (self.data[4] & 0x80) != 0
    }

    /// Command (initialization packets only)
    pub fn cmd(&self) -> Option<Cmd> {
        if !self.is_init() {
            return None;
        }
        Cmd::from_u8(self.data[4])
    }

    /// Declared total payload length (initialization packets only)
    pub fn payload_len(&self) -> Option<u16> {
        if !self.is_init() {
            return None;
        }
        Some(u16::from_be_bytes([self.data[5], self.data[6]]))
    }

    /// Sequence index (continuation packets only)
    pub fn seq(&self) -> Option<u8> {
        if self.is_init() {
            return None;
        }
        Some(self.data[4])
    }

    /// Payload portion of the report
    pub fn payload(&self) -> &[u8] {
        if self.is_init() {
            &self.data[INIT_HEADER..]
        } else {
            &self.data[CONT_HEADER..]
        }
    }
}

/// A complete CTAPHID message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel id
    pub cid: u32,

    /// CTAPHID command
    pub cmd: Cmd,

    /// Payload
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(cid: u32, cmd: Cmd, data: Vec<u8>) -> Self {
        Self { cid, cmd, data }
    }

    /// Fragment this message into reports of `report_size` bytes
    pub fn to_packets(&self, report_size: usize) -> Result<Vec<Packet>> {
        if report_size < MIN_REPORT_SIZE {
            return Err(Error::InvalidReport);
        }
        if self.data.len() > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge);
        }

        let init_capacity = report_size - INIT_HEADER;
        let cont_capacity = report_size - CONT_HEADER;

        let mut packets = Vec::new();

        let mut init = vec![0u8; report_size];
        init[0..4].copy_from_slice(&self.cid.to_be_bytes());
        init[4] = self.cmd.to_u8_init();
        init[5..7].copy_from_slice(&(self.data.len() as u16).to_be_bytes());

        let init_len = self.data.len().min(init_capacity);
        init[INIT_HEADER..INIT_HEADER + init_len].copy_from_slice(&self.data[..init_len]);
        packets.push(Packet { data: init });

        let mut remaining = &self.data[init_len..];
        let mut seq = 0u8;

        while !remaining.is_empty() {
            if seq > 127 {
                // SEQ is 7 bits; at most 128 continuation packets
                return Err(Error::MessageTooLarge);
            }

            let mut cont = vec![0u8; report_size];
            cont[0..4].copy_from_slice(&self.cid.to_be_bytes());
            cont[4] = seq;

            let cont_len = remaining.len().min(cont_capacity);
            cont[CONT_HEADER..CONT_HEADER + cont_len].copy_from_slice(&remaining[..cont_len]);
            packets.push(Packet { data: cont });

            remaining = &remaining[cont_len..];
            seq += 1;
        }

        Ok(packets)
    }

    /// Reassemble a message from reports
    ///
    /// The payload is exactly the declared length: report padding past it is
    /// discarded, a shortfall fails with `Fragmentation`.
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let init = packets.first().ok_or(Error::InvalidReport)?;
        if !init.is_init() {
            return Err(Error::InvalidReport);
        }

        let cid = init.cid();
        let cmd = init.cmd().ok_or(Error::InvalidCommand)?;
        let total_len = init.payload_len().ok_or(Error::InvalidReport)? as usize;

        if total_len > MAX_MESSAGE_SIZE {
            return Err(Error::MessageTooLarge);
        }

        let mut data = Vec::with_capacity(total_len);
        let init_len = total_len.min(init.payload().len());
        data.extend_from_slice(&init.payload()[..init_len]);

        let mut remaining = total_len - init_len;

        for (expected_seq, packet) in packets[1..].iter().enumerate() {
            if remaining == 0 {
                // Surplus report past the declared length
                break;
            }
            if packet.is_init() {
                return Err(Error::InvalidSequence);
            }
            if packet.cid() != cid {
                return Err(Error::InvalidChannel);
            }

            let seq = packet.seq().ok_or(Error::InvalidSequence)?;
            if seq as usize != expected_seq {
                return Err(Error::InvalidSequence);
            }

            let chunk = remaining.min(packet.payload().len());
            data.extend_from_slice(&packet.payload()[..chunk]);
            remaining -= chunk;
        }

        if remaining != 0 {
            return Err(Error::Fragmentation);
        }

        Ok(Message { cid, cmd, data })
    }
}
