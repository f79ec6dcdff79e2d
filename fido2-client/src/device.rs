//! Authenticator session over a CTAPHID transport
//!
//! A `Device` owns one HID handle and one allocated channel. Opening runs the
//! INIT handshake on the broadcast channel, then probes the authenticator
//! with getInfo. After that every CTAP2 command goes through `transact`,
//! which frames the request, skips traffic for other channels, absorbs
//! KEEPALIVE frames and turns the status byte into a typed error.
//!
//! A transport failure mid-transaction leaves the channel state unknown, so
//! the session latches into a failed state and refuses further work until
//! the device is reopened.

use crate::error::{Error, Result};
use crate::info::DeviceInfo;

use fido2_client_ctap::{CborError, CtapCommand, StatusCode};
use fido2_client_transport::{
    BROADCAST_CID, Cmd, ErrorCode, HidDevice, MAX_MESSAGE_SIZE, Message, Packet,
};

use rand::RngCore;
use rand::rngs::OsRng;
use smallvec::SmallVec;

use std::time::Duration;

/// Default per-read timeout, long enough for a user-presence touch
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads to tolerate before giving up on an INIT response
const INIT_READ_BUDGET: usize = 16;

/// INIT response payload: nonce(8) + CID(4) + proto(1) + version(3) + caps(1)
const INIT_RESPONSE_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    InFlight,
    Failed,
}

/// An open session with one authenticator
pub struct Device<D: HidDevice> {
    hid: D,
    cid: u32,
    state: SessionState,
    timeout: Duration,
    info: DeviceInfo,
    /// CTAPHID protocol version from the INIT response
    ctaphid_version: u8,
    /// Capability flags from the INIT response (CAPFLAG_WINK = 0x01)
    capabilities: u8,
}

impl<D: HidDevice> Device<D> {
    /// Open a session: allocate a channel, then probe with getInfo
    pub fn open(hid: D) -> Result<Self> {
        Self::open_with_timeout(hid, DEFAULT_TIMEOUT)
    }

    pub fn open_with_timeout(mut hid: D, timeout: Duration) -> Result<Self> {
        let init = init_channel(&mut hid, timeout)?;

        let mut device = Self {
            hid,
            cid: init.cid,
            state: SessionState::Idle,
            timeout,
            info: DeviceInfo::default(),
            ctaphid_version: init.ctaphid_version,
            capabilities: init.capabilities,
        };

        let payload = device.transact(CtapCommand::GetInfo, &[])?;
        device.info = DeviceInfo::from_cbor(&payload)?;

        Ok(device)
    }

    /// Capabilities reported by getInfo at open time
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Allocated channel id
    pub fn channel_id(&self) -> u32 {
        self.cid
    }

    pub fn ctaphid_version(&self) -> u8 {
        self.ctaphid_version
    }

    /// Whether the authenticator advertises the WINK capability
    pub fn supports_wink(&self) -> bool {
        self.capabilities & 0x01 != 0
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Release the channel and the underlying HID handle
    pub fn close(self) {}

    /// Run one CTAP2 command and return the response body past the status byte
    ///
    /// `params` is the CBOR-encoded request map, empty for parameterless
    /// commands. Statuses meaning an expired or rejected PIN/UV token come
    /// back as `Error::Auth`, every other non-success status as
    /// `Error::Device`.
    pub fn transact(&mut self, command: CtapCommand, params: &[u8]) -> Result<Vec<u8>> {
        let mut payload: SmallVec<[u8; 256]> = SmallVec::with_capacity(1 + params.len());
        payload.push(command.as_u8());
        payload.extend_from_slice(params);

        let response = self.exchange(Cmd::Cbor, &payload)?;

        let (&status_byte, body) = response
            .split_first()
            .ok_or(Error::Parse(CborError::Decode))?;

        let status = StatusCode::from_u8(status_byte);
        if !status.is_success() {
            return Err(Error::from_status(status));
        }

        Ok(body.to_vec())
    }

    /// Ask the authenticator to identify itself (blink, beep)
    pub fn wink(&mut self) -> Result<()> {
        if !self.supports_wink() {
            return Err(Error::InvalidParameter("authenticator has no wink capability"));
        }
        self.exchange(Cmd::Wink, &[])?;
        Ok(())
    }

    /// Send a request and wait for the matching response message
    ///
    /// State machine around the raw exchange: a request already in flight is
    /// a caller bug, a transport failure poisons the session.
    fn exchange(&mut self, cmd: Cmd, payload: &[u8]) -> Result<Vec<u8>> {
        match self.state {
            SessionState::Failed => return Err(Error::SessionFailed),
            SessionState::InFlight => return Err(Error::Concurrency),
            SessionState::Idle => {}
        }

        self.state = SessionState::InFlight;
        let result = self.exchange_inner(cmd, payload);
        self.state = match &result {
            Err(Error::Transport(_)) => SessionState::Failed,
            _ => SessionState::Idle,
        };
        result
    }

    fn exchange_inner(&mut self, cmd: Cmd, payload: &[u8]) -> Result<Vec<u8>> {
        let message = Message::new(self.cid, cmd, payload.to_vec());
        for packet in message.to_packets(self.hid.report_size())? {
            self.hid.write_report(packet.as_bytes())?;
        }

        loop {
            let response = self.read_message()?;
            match response.cmd {
                // Authenticator is still working, keep waiting
                Cmd::Keepalive => continue,
                Cmd::Error => {
                    let code = response
                        .data
                        .first()
                        .map(|&b| ErrorCode::from_u8(b))
                        .unwrap_or(ErrorCode::Other);
                    return Err(fido2_client_transport::Error::Device(code).into());
                }
                c if c == cmd => return Ok(response.data),
                _ => return Err(fido2_client_transport::Error::InvalidCommand.into()),
            }
        }
    }

    /// Collect one complete message addressed to our channel
    fn read_message(&mut self) -> Result<Message> {
        let init = loop {
            let packet = self.read_packet()?;
            if packet.cid() != self.cid {
                // Traffic for another channel, not ours to consume
                continue;
            }
            if !packet.is_init() {
                // Stray continuation from an abandoned response
                continue;
            }
            break packet;
        };

        let total = init.payload_len().ok_or(fido2_client_transport::Error::InvalidReport)? as usize;
        if total > MAX_MESSAGE_SIZE {
            return Err(fido2_client_transport::Error::MessageTooLarge.into());
        }

        let mut received = init.payload().len().min(total);
        let mut packets = vec![init];

        while received < total {
            let packet = self.read_packet()?;
            if packet.cid() != self.cid {
                continue;
            }
            received += packet.payload().len().min(total - received);
            packets.push(packet);
        }

        Ok(Message::from_packets(&packets)?)
    }

    fn read_packet(&mut self) -> Result<Packet> {
        let report = self.hid.read_report(self.timeout)?;
        Ok(Packet::from_report(&report)?)
    }
}

struct InitResponse {
    cid: u32,
    ctaphid_version: u8,
    capabilities: u8,
}

/// Allocate a channel id on the broadcast channel
///
/// Sends an 8-byte nonce and waits for the response echoing it. Responses
/// carrying someone else's nonce belong to a concurrent client and are
/// skipped.
fn init_channel<D: HidDevice>(hid: &mut D, timeout: Duration) -> Result<InitResponse> {
    let mut nonce = [0u8; 8];
    OsRng.fill_bytes(&mut nonce);

    let message = Message::new(BROADCAST_CID, Cmd::Init, nonce.to_vec());
    for packet in message.to_packets(hid.report_size())? {
        hid.write_report(packet.as_bytes())?;
    }

    for _ in 0..INIT_READ_BUDGET {
        let report = hid.read_report(timeout)?;
        let packet = Packet::from_report(&report)?;

        if packet.cid() != BROADCAST_CID || packet.cmd() != Some(Cmd::Init) {
            continue;
        }

        let len = packet.payload_len().unwrap_or(0) as usize;
        if len < INIT_RESPONSE_LEN || len > packet.payload().len() {
            return Err(Error::Init("short INIT response".to_string()));
        }
        let payload = &packet.payload()[..len];

        if payload[..8] != nonce {
            // Another client's handshake
            continue;
        }

        let cid = u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]);
        if cid == BROADCAST_CID || cid == 0 {
            return Err(Error::Init(format!("invalid channel id {cid:#010x}")));
        }

        return Ok(InitResponse {
            cid,
            ctaphid_version: payload[12],
            capabilities: payload[16],
        });
    }

    Err(Error::Init(
        "no INIT response matched our nonce".to_string(),
    ))
}
