//! Test doubles: a scripted HID transport and an authenticator model
//!
//! `MockHidDevice` replays canned CTAPHID traffic. Simple scenarios queue
//! whole response frames up front; PIN and assertion flows need replies
//! computed from the request (ECDH, MACs), so the mock also takes a
//! responder callback consulted when the queue runs dry.

#![allow(dead_code)]

use fido2_client::ctap::cbor::{self, Value};
use fido2_client::ctap::{MapBuilder, MapParser};
use fido2_client::transport::{
    BROADCAST_CID, Cmd, Error as TransportError, HidDevice, Message, Packet,
    Result as TransportResult,
};

use fido2_client_crypto::ecdh::{KeyPair, sec1_from_cose};
use fido2_client_crypto::ecdsa;
use fido2_client_crypto::pin_protocol::{pin_hash, v1, v2};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Channel id the mock assigns during INIT
pub const CHANNEL_ID: u32 = 0x0BAD_F00D;

const REPORT_SIZE: usize = 64;

/// One scripted reply
enum Reply {
    /// A framed CTAPHID message on the assigned channel
    Message(Cmd, Vec<u8>),
    /// A single raw report pushed verbatim (noise, wrong channels)
    RawReport(Vec<u8>),
    /// No response at all; the next read times out
    Silence,
}

struct Inner {
    queue: VecDeque<Reply>,
    /// Fallback for request-dependent replies: (ctap command byte, request
    /// CBOR) -> full response payload including the status byte
    responder: Option<Box<dyn FnMut(u8, &[u8]) -> Vec<u8>>>,
    outbound: VecDeque<Vec<u8>>,
    pending: Vec<Packet>,
    pending_total: usize,
    pending_received: usize,
    /// Requests seen so far as (command, payload)
    requests: Vec<(Cmd, Vec<u8>)>,
    /// Push a bogus INIT response (wrong nonce) before the real one
    init_noise: bool,
}

impl Inner {
    fn push_message(&mut self, cmd: Cmd, data: Vec<u8>) {
        self.push_message_on(CHANNEL_ID, cmd, data);
    }

    fn push_message_on(&mut self, cid: u32, cmd: Cmd, data: Vec<u8>) {
        let message = Message::new(cid, cmd, data);
        for packet in message.to_packets(REPORT_SIZE).expect("framing canned reply") {
            self.outbound.push_back(packet.as_bytes().to_vec());
        }
    }

    fn handle_report(&mut self, report: &[u8]) -> TransportResult<()> {
        let packet = Packet::from_report(report)?;

        if packet.is_init() {
            self.pending_total = packet.payload_len().unwrap_or(0) as usize;
            self.pending_received = packet.payload().len().min(self.pending_total);
            self.pending = vec![packet];
        } else {
            self.pending_received += packet
                .payload()
                .len()
                .min(self.pending_total - self.pending_received);
            self.pending.push(packet);
        }

        if self.pending_received >= self.pending_total && !self.pending.is_empty() {
            let packets = std::mem::take(&mut self.pending);
            let message = Message::from_packets(&packets)?;
            self.dispatch(message);
        }

        Ok(())
    }

    fn dispatch(&mut self, message: Message) {
        self.requests.push((message.cmd, message.data.clone()));

        match message.cmd {
            Cmd::Init if message.cid == BROADCAST_CID => {
                if self.init_noise {
                    self.init_noise = false;
                    let mut bogus = init_response(&[0xFF; 8]);
                    bogus[8..12].copy_from_slice(&0x1111_1111u32.to_be_bytes());
                    self.push_message_on(BROADCAST_CID, Cmd::Init, bogus);
                }
                let nonce: [u8; 8] = message.data[..8].try_into().expect("8-byte nonce");
                self.push_message_on(BROADCAST_CID, Cmd::Init, init_response(&nonce));
            }
            Cmd::Wink => {
                self.push_message(Cmd::Wink, Vec::new());
            }
            Cmd::Cbor => self.reply_cbor(&message.data),
            _ => {}
        }
    }

    fn reply_cbor(&mut self, request: &[u8]) {
        loop {
            match self.queue.pop_front() {
                Some(Reply::Message(cmd @ (Cmd::Keepalive | Cmd::Error), data)) => {
                    // Interim frames, then keep looking for the real reply
                    let is_error = cmd == Cmd::Error;
                    self.push_message(cmd, data);
                    if is_error {
                        return;
                    }
                }
                Some(Reply::Message(cmd, data)) => {
                    self.push_message(cmd, data);
                    return;
                }
                Some(Reply::RawReport(report)) => {
                    self.outbound.push_back(report);
                }
                Some(Reply::Silence) => return,
                None => break,
            }
        }

        if let Some(responder) = self.responder.as_mut() {
            let (&cmd, cbor) = request.split_first().expect("nonempty CTAP request");
            let payload = responder(cmd, cbor);
            self.push_message(Cmd::Cbor, payload);
        }
    }
}

fn init_response(nonce: &[u8; 8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(17);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&CHANNEL_ID.to_be_bytes());
    payload.push(2); // CTAPHID protocol version
    payload.extend_from_slice(&[1, 0, 0]); // device version
    payload.push(0x05); // capabilities: WINK | CBOR
    payload
}

/// Scripted HID transport
pub struct MockHidDevice {
    inner: Rc<RefCell<Inner>>,
}

/// Handle the test keeps to script the device after it moves into a session
#[derive(Clone)]
pub struct MockHandle {
    inner: Rc<RefCell<Inner>>,
}

impl MockHidDevice {
    pub fn new() -> (Self, MockHandle) {
        let inner = Rc::new(RefCell::new(Inner {
            queue: VecDeque::new(),
            responder: None,
            outbound: VecDeque::new(),
            pending: Vec::new(),
            pending_total: 0,
            pending_received: 0,
            requests: Vec::new(),
            init_noise: false,
        }));
        (
            Self {
                inner: inner.clone(),
            },
            MockHandle { inner },
        )
    }
}

impl HidDevice for MockHidDevice {
    fn write_report(&mut self, report: &[u8]) -> TransportResult<()> {
        self.inner.borrow_mut().handle_report(report)
    }

    fn read_report(&mut self, _timeout: Duration) -> TransportResult<Vec<u8>> {
        self.inner
            .borrow_mut()
            .outbound
            .pop_front()
            .ok_or(TransportError::Timeout)
    }

    fn report_size(&self) -> usize {
        REPORT_SIZE
    }
}

impl MockHandle {
    /// Queue a successful CBOR response with the given body
    pub fn queue_ok(&self, cbor: &[u8]) {
        let mut payload = Vec::with_capacity(1 + cbor.len());
        payload.push(0x00);
        payload.extend_from_slice(cbor);
        self.queue_message(Cmd::Cbor, payload);
    }

    /// Queue a bare status byte response
    pub fn queue_status(&self, status: u8) {
        self.queue_message(Cmd::Cbor, vec![status]);
    }

    /// Queue a KEEPALIVE frame before the next real reply
    pub fn queue_keepalive(&self) {
        self.queue_message(Cmd::Keepalive, vec![0x01]);
    }

    /// Queue a CTAPHID error frame
    pub fn queue_transport_error(&self, code: u8) {
        self.queue_message(Cmd::Error, vec![code]);
    }

    /// Queue one raw report exactly as given
    pub fn queue_raw_report(&self, report: Vec<u8>) {
        self.inner.borrow_mut().queue.push_back(Reply::RawReport(report));
    }

    /// Make the next transaction get no reply at all
    pub fn queue_silence(&self) {
        self.inner.borrow_mut().queue.push_back(Reply::Silence);
    }

    fn queue_message(&self, cmd: Cmd, data: Vec<u8>) {
        self.inner
            .borrow_mut()
            .queue
            .push_back(Reply::Message(cmd, data));
    }

    /// Install the request-dependent fallback responder
    pub fn set_responder(&self, responder: impl FnMut(u8, &[u8]) -> Vec<u8> + 'static) {
        self.inner.borrow_mut().responder = Some(Box::new(responder));
    }

    /// Answer the next INIT with a wrong-nonce response first
    pub fn inject_init_noise(&self) {
        self.inner.borrow_mut().init_noise = true;
    }

    /// CTAP requests observed so far, newest last
    pub fn requests(&self) -> Vec<(Cmd, Vec<u8>)> {
        self.inner.borrow().requests.clone()
    }
}

/// A plausible getInfo body: FIDO2 versions, credMgmt, both PIN protocols
pub fn default_get_info() -> Vec<u8> {
    use std::collections::BTreeMap;

    MapBuilder::new()
        .insert(0x01, vec!["FIDO_2_0", "FIDO_2_1"])
        .unwrap()
        .insert(0x02, vec!["hmac-secret", "credProtect"])
        .unwrap()
        .insert_bytes(0x03, &[0xA1; 16])
        .unwrap()
        .insert(
            0x04,
            BTreeMap::from([
                ("rk".to_string(), true),
                ("clientPin".to_string(), true),
                ("credMgmt".to_string(), true),
            ]),
        )
        .unwrap()
        .insert(0x06, vec![2u64, 1u64])
        .unwrap()
        .build()
        .unwrap()
}

/// Open a device against a fresh mock with getInfo already queued
pub fn open_device() -> (fido2_client::Device<MockHidDevice>, MockHandle) {
    let (hid, handle) = MockHidDevice::new();
    handle.queue_ok(&default_get_info());
    let device = fido2_client::Device::open(hid).expect("mock open");
    (device, handle)
}

/// Authenticator-side model of the ClientPin crypto
///
/// Lives behind the mock's responder so replies can depend on the platform
/// key agreement in the request.
pub struct MockAuthenticator {
    pub key_pair: KeyPair,
    pub protocol: u8,
    pub pin: String,
    pub token: [u8; 32],
    pub retries: u64,
    shared: Option<[u8; 32]>,
    stored_client_data_hash: Option<Vec<u8>>,
}

impl MockAuthenticator {
    pub fn new(protocol: u8, pin: &str) -> Self {
        Self {
            key_pair: KeyPair::generate(),
            protocol,
            pin: pin.to_string(),
            token: [0xAB; 32],
            retries: 8,
            shared: None,
            stored_client_data_hash: None,
        }
    }

    pub fn cose_key(&self) -> Vec<u8> {
        let (x, y) = self.key_pair.public_key_cose();
        MapBuilder::new()
            .insert(1, 2u8)
            .unwrap()
            .insert(3, -25i8)
            .unwrap()
            .insert(-1, 1u8)
            .unwrap()
            .insert_bytes(-2, &x)
            .unwrap()
            .insert_bytes(-3, &y)
            .unwrap()
            .build()
            .unwrap()
    }

    fn derive_shared(&mut self, platform_cose: Value) -> [u8; 32] {
        let cose = MapParser::from_value(platform_cose).expect("platform COSE key");
        let x = cose.get_bytes(-2).unwrap();
        let y = cose.get_bytes(-3).unwrap();
        let sec1 = sec1_from_cose(&x, &y).unwrap();
        let shared = self.key_pair.shared_secret(&sec1).unwrap();
        self.shared = Some(shared);
        shared
    }

    fn encrypt(&self, shared: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
        match self.protocol {
            1 => v1::encrypt(&v1::derive_key(shared), plaintext).unwrap(),
            _ => v2::encrypt(&v2::derive_aes_key(shared), plaintext).unwrap(),
        }
    }

    fn decrypt(&self, shared: &[u8; 32], ciphertext: &[u8]) -> Vec<u8> {
        match self.protocol {
            1 => v1::decrypt(&v1::derive_key(shared), ciphertext).unwrap(),
            _ => v2::decrypt(&v2::derive_aes_key(shared), ciphertext).unwrap(),
        }
    }

    fn verify(&self, shared: &[u8; 32], message: &[u8], mac: &[u8]) -> bool {
        match self.protocol {
            1 => mac
                .try_into()
                .map(|mac: &[u8; 16]| v1::verify(&v1::derive_key(shared), message, mac))
                .unwrap_or(false),
            _ => mac
                .try_into()
                .map(|mac: &[u8; 32]| v2::verify(&v2::derive_hmac_key(shared), message, mac))
                .unwrap_or(false),
        }
    }

    /// Handle one authenticatorClientPIN request, returning the full
    /// response payload (status byte first)
    pub fn handle_client_pin(&mut self, request: &[u8]) -> Vec<u8> {
        let parser = MapParser::from_bytes(request).expect("ClientPin request map");
        let subcommand: u8 = parser.get(0x02).unwrap();

        match subcommand {
            // getPinRetries
            0x01 => ok_body(
                &MapBuilder::new()
                    .insert(0x03, self.retries)
                    .unwrap()
                    .build()
                    .unwrap(),
            ),
            // getKeyAgreement
            0x02 => ok_body(
                &MapBuilder::new()
                    .insert_raw(0x01, self.cose_key())
                    .build()
                    .unwrap(),
            ),
            // setPIN
            0x03 => {
                let platform_cose = parser.get_raw(0x03).expect("key agreement in request");
                let shared = self.derive_shared(platform_cose);

                let new_pin_enc = parser.get_bytes(0x05).unwrap();
                let auth_param = parser.get_bytes(0x04).unwrap();
                if !self.verify(&shared, &new_pin_enc, &auth_param) {
                    return vec![0x33]; // CTAP2_ERR_PIN_AUTH_INVALID
                }

                let padded = self.decrypt(&shared, &new_pin_enc);
                let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
                self.pin = String::from_utf8(padded[..end].to_vec()).unwrap();
                vec![0x00]
            }
            // changePIN
            0x04 => {
                let platform_cose = parser.get_raw(0x03).expect("key agreement in request");
                let shared = self.derive_shared(platform_cose);

                let new_pin_enc = parser.get_bytes(0x05).unwrap();
                let pin_hash_enc = parser.get_bytes(0x06).unwrap();
                let auth_param = parser.get_bytes(0x04).unwrap();

                let mut message = new_pin_enc.clone();
                message.extend_from_slice(&pin_hash_enc);
                if !self.verify(&shared, &message, &auth_param) {
                    return vec![0x33];
                }

                let received = self.decrypt(&shared, &pin_hash_enc);
                if received != pin_hash(&self.pin)[..] {
                    self.retries -= 1;
                    return vec![0x31];
                }

                let padded = self.decrypt(&shared, &new_pin_enc);
                let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
                self.pin = String::from_utf8(padded[..end].to_vec()).unwrap();
                vec![0x00]
            }
            // getPinToken / getPinUvAuthTokenUsingPinWithPermissions
            0x05 | 0x09 => {
                let platform_cose = parser.get_raw(0x03).expect("key agreement in request");
                let shared = self.derive_shared(platform_cose);

                let pin_hash_enc = parser.get_bytes(0x06).unwrap();
                let received = self.decrypt(&shared, &pin_hash_enc);
                let expected = pin_hash(&self.pin);

                if received != expected[..] {
                    self.retries -= 1;
                    return vec![0x31]; // CTAP2_ERR_PIN_INVALID
                }

                let token_enc = self.encrypt(&shared, &self.token);
                ok_body(
                    &MapBuilder::new()
                        .insert_bytes(0x02, &token_enc)
                        .unwrap()
                        .build()
                        .unwrap(),
                )
            }
            _ => vec![0x26], // CTAP2_ERR_UNSUPPORTED_OPTION
        }
    }

    /// Shared secret after the last token exchange
    pub fn shared_secret(&self) -> [u8; 32] {
        self.shared.expect("token exchange ran")
    }

    /// hmac-secret output for one salt under a fixed per-credential key
    pub fn hmac_secret_output(cred_random: &[u8; 32], salt: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(cred_random).unwrap();
        mac.update(salt);
        mac.finalize().into_bytes().into()
    }

    /// Decrypt an hmac-secret saltEnc from a request extension
    pub fn decrypt_salts(&self, salt_enc: &[u8]) -> Vec<u8> {
        let shared = self.shared_secret();
        self.decrypt(&shared, salt_enc)
    }

    /// Encrypt hmac-secret outputs for the response extension
    pub fn encrypt_outputs(&self, outputs: &[u8]) -> Vec<u8> {
        let shared = self.shared_secret();
        self.encrypt(&shared, outputs)
    }
}

/// One resident credential the authenticator model can assert with
pub struct MockCredential {
    pub private_key: [u8; 32],
    pub public_sec1: Vec<u8>,
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    /// Per-credential key the hmac-secret outputs derive from
    pub cred_random: [u8; 32],
    pub sign_count: u32,
}

impl MockCredential {
    pub fn new(rp_id: &str) -> Self {
        let (private_key, public_sec1) = ecdsa::generate_keypair();
        Self {
            private_key,
            public_sec1,
            credential_id: vec![0xC1; 16],
            rp_id: rp_id.to_string(),
            cred_random: [0x77; 32],
            sign_count: 7,
        }
    }

    /// Credential public key as the COSE_Key map getAssertion callers verify
    /// against
    pub fn cose_public_key(&self) -> Vec<u8> {
        MapBuilder::new()
            .insert(1, 2u8)
            .unwrap()
            .insert(3, -7i8)
            .unwrap()
            .insert(-1, 1u8)
            .unwrap()
            .insert_bytes(-2, &self.public_sec1[1..33])
            .unwrap()
            .insert_bytes(-3, &self.public_sec1[33..65])
            .unwrap()
            .build()
            .unwrap()
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        Sha256::digest(self.rp_id.as_bytes()).into()
    }
}

impl MockAuthenticator {
    /// Handle one authenticatorGetAssertion request against `credential`
    ///
    /// Honors the hmac-secret extension input when present, deriving the
    /// shared secret from the platform key agreement inside the extension.
    pub fn handle_get_assertion(
        &mut self,
        request: &[u8],
        credential: &MockCredential,
        user: Option<&fido2_client::User>,
        count: u64,
    ) -> Vec<u8> {
        // getNextAssertion (0x08) carries no parameters; sign over the
        // clientDataHash stored from the preceding getAssertion.
        let (client_data_hash, extension_body) = if request.is_empty() {
            let hash = self
                .stored_client_data_hash
                .clone()
                .expect("getNextAssertion without a preceding getAssertion");
            (hash, None)
        } else {
            let parser = MapParser::from_bytes(request).expect("getAssertion request map");
            let client_data_hash = parser.get_bytes(0x02).unwrap();
            self.stored_client_data_hash = Some(client_data_hash.clone());

            // hmac-secret extension, when requested
            let extension_body = parser.get_raw(0x04).map(|extensions| {
                let Value::Map(entries) = extensions else {
                    panic!("extensions must be a map");
                };
                let input = entries
                    .into_iter()
                    .find_map(|(k, v)| match k {
                        Value::Text(t) if t == "hmac-secret" => Some(v),
                        _ => None,
                    })
                    .expect("hmac-secret input");

                let inner = MapParser::from_value(input).unwrap();
                let platform_cose = inner.get_raw(1).expect("platform key agreement");
                self.derive_shared(platform_cose);

                let salts = self.decrypt_salts(&inner.get_bytes(2).unwrap());
                let mut outputs = Vec::with_capacity(salts.len());
                for salt in salts.chunks(32) {
                    outputs.extend_from_slice(&Self::hmac_secret_output(
                        &credential.cred_random,
                        salt,
                    ));
                }
                self.encrypt_outputs(&outputs)
            });
            (client_data_hash, extension_body)
        };

        let mut flags = 0x01u8; // user present
        if extension_body.is_some() {
            flags |= 0x80;
        }

        let mut auth_data = Vec::with_capacity(64);
        auth_data.extend_from_slice(&credential.rp_id_hash());
        auth_data.push(flags);
        auth_data.extend_from_slice(&credential.sign_count.to_be_bytes());
        if let Some(output) = extension_body {
            auth_data.extend_from_slice(&extension_map(
                "hmac-secret",
                Value::Bytes(output),
            ));
        }

        let mut signed = auth_data.clone();
        signed.extend_from_slice(&client_data_hash);
        let signature = ecdsa::sign(&credential.private_key, &signed).unwrap();

        let mut builder = MapBuilder::new()
            .insert(
                0x01,
                fido2_client::PublicKeyCredentialDescriptor::new(credential.credential_id.clone()),
            )
            .unwrap()
            .insert_bytes(0x02, &auth_data)
            .unwrap()
            .insert_bytes(0x03, &signature)
            .unwrap();
        if let Some(user) = user {
            builder = builder.insert(0x04, user).unwrap();
        }
        if count > 1 {
            builder = builder.insert(0x05, count).unwrap();
        }

        ok_body(&builder.build().unwrap())
    }
}

fn ok_body(cbor: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + cbor.len());
    payload.push(0x00);
    payload.extend_from_slice(cbor);
    payload
}

/// Build a text-keyed single-entry extension map
pub fn extension_map(name: &str, value: Value) -> Vec<u8> {
    cbor::encode(&Value::Map(vec![(Value::Text(name.to_string()), value)])).unwrap()
}
