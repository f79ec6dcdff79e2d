//! authenticatorGetAssertion (0x02) and getNextAssertion (0x08)
//!
//! Builds the request map, runs the transaction and walks the follow-up
//! getNextAssertion calls when the authenticator holds several matching
//! credentials. Assertions come back in device order; index 0 is the one
//! the authenticator considers current.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::pin::{PinToken, PinUvAuthSession};
use crate::request::GetAssertionRequest;

use fido2_client_crypto::ecdh::sec1_from_cose;
use fido2_client_crypto::ecdsa;
use fido2_client_ctap::cbor;
use fido2_client_ctap::types::{PublicKeyCredentialDescriptor, User};
use fido2_client_ctap::{CborError, CtapCommand, MapBuilder, MapParser, Value};
use fido2_client_transport::HidDevice;

use zeroize::Zeroizing;

// Request keys
const KEY_RP_ID: i32 = 0x01;
const KEY_CLIENT_DATA_HASH: i32 = 0x02;
const KEY_ALLOW_LIST: i32 = 0x03;
const KEY_EXTENSIONS: i32 = 0x04;
const KEY_OPTIONS: i32 = 0x05;
const KEY_PIN_UV_AUTH_PARAM: i32 = 0x06;
const KEY_PIN_UV_AUTH_PROTOCOL: i32 = 0x07;

// Response keys
const RESP_CREDENTIAL: i32 = 0x01;
const RESP_AUTH_DATA: i32 = 0x02;
const RESP_SIGNATURE: i32 = 0x03;
const RESP_USER: i32 = 0x04;
const RESP_NUMBER_OF_CREDENTIALS: i32 = 0x05;

// Authenticator data flags
pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_ATTESTED_CREDENTIAL_DATA: u8 = 0x40;
pub const FLAG_EXTENSION_DATA: u8 = 0x80;

/// rpIdHash(32) + flags(1) + signCount(4)
const AUTH_DATA_MIN_LEN: usize = 37;

const HMAC_SECRET: &str = "hmac-secret";

/// One signed assertion
#[derive(Debug, Clone)]
pub struct Assertion {
    /// Credential the assertion was made with
    pub credential: Option<PublicKeyCredentialDescriptor>,

    /// Raw authenticator data, the first half of the signed message
    pub auth_data: Vec<u8>,

    /// DER-encoded ES256 signature over authData || clientDataHash
    pub signature: Vec<u8>,

    /// User entity, returned only for discoverable-credential requests
    pub user: Option<User>,

    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,

    /// Decrypted hmac-secret output (32 or 64 bytes) when requested
    pub hmac_secret: Option<Zeroizing<Vec<u8>>>,
}

impl Assertion {
    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// Verify the ES256 signature against a credential's COSE public key
    ///
    /// The signed message is authData || clientDataHash. Opt-in; nothing
    /// else in the engine calls this.
    pub fn verify(&self, client_data_hash: &[u8; 32], cose_public_key: &[u8]) -> Result<()> {
        let cose = MapParser::from_bytes(cose_public_key)?;
        let x = cose.get_bytes(-2)?;
        let y = cose.get_bytes(-3)?;
        let public_key = sec1_from_cose(&x, &y)?;

        let mut message = Vec::with_capacity(self.auth_data.len() + client_data_hash.len());
        message.extend_from_slice(&self.auth_data);
        message.extend_from_slice(client_data_hash);

        ecdsa::verify(&public_key, &message, &self.signature)?;
        Ok(())
    }

    /// Parse one assertion response map
    ///
    /// `discoverable` is whether the request had no allow-list; a user
    /// handle on an allow-list assertion violates the protocol.
    fn from_cbor(
        payload: &[u8],
        discoverable: bool,
        session: Option<&PinUvAuthSession>,
    ) -> Result<(Self, u64)> {
        let parser = MapParser::from_bytes(payload)?;

        let credential: Option<PublicKeyCredentialDescriptor> = parser.get_opt(RESP_CREDENTIAL)?;
        let auth_data = parser.get_bytes(RESP_AUTH_DATA)?;
        let signature = parser.get_bytes(RESP_SIGNATURE)?;
        if signature.is_empty() {
            return Err(Error::Parse(CborError::Decode));
        }

        let user: Option<User> = parser.get_opt(RESP_USER)?;
        if !discoverable {
            if let Some(ref u) = user {
                if !u.id.is_empty() {
                    return Err(Error::Parse(CborError::Decode));
                }
            }
        }

        let count: u64 = parser.get_opt(RESP_NUMBER_OF_CREDENTIALS)?.unwrap_or(1);

        let (rp_id_hash, flags, sign_count, extensions) = parse_auth_data(&auth_data)?;

        let hmac_secret = match (extensions, session) {
            (Some(outputs), Some(session)) => match extension_output(&outputs, HMAC_SECRET)? {
                Some(encrypted) => Some(session.unwrap_hmac_secret(&encrypted)?),
                None => None,
            },
            _ => None,
        };

        Ok((
            Self {
                credential,
                auth_data,
                signature,
                user,
                rp_id_hash,
                flags,
                sign_count,
                hmac_secret,
            },
            count,
        ))
    }
}

/// Run getAssertion and collect every returned assertion
///
/// `token` authenticates the request when the RP requires user verification;
/// `session` is needed to encrypt and decrypt hmac-secret salts and must be
/// the one the token was derived on.
pub fn get_assertion<D: HidDevice>(
    device: &mut Device<D>,
    request: &GetAssertionRequest,
    token: Option<&PinToken>,
    session: Option<&PinUvAuthSession>,
) -> Result<Vec<Assertion>> {
    if request.hmac_salts.len() > 2 {
        return Err(Error::InvalidParameter("at most two hmac-secret salts"));
    }
    if request.rp_id.is_empty() {
        return Err(Error::InvalidParameter("relying party id is empty"));
    }

    let discoverable = request.allow_list.is_empty();

    let mut builder = MapBuilder::new()
        .insert(KEY_RP_ID, &request.rp_id)?
        .insert_bytes(KEY_CLIENT_DATA_HASH, request.client_data_hash.as_bytes())?;

    if !request.allow_list.is_empty() {
        builder = builder.insert(KEY_ALLOW_LIST, &request.allow_list)?;
    }

    if !request.hmac_salts.is_empty() {
        let mut salts = Zeroizing::new(Vec::with_capacity(request.hmac_salts.len() * 32));
        for salt in &request.hmac_salts {
            salts.extend_from_slice(salt);
        }
        let Some(session) = session else {
            return Err(Error::InvalidParameter(
                "hmac-secret requires an established key agreement",
            ));
        };
        let input = session.wrap_hmac_salt(&salts)?;
        builder = builder.insert_raw(KEY_EXTENSIONS, extension_input_map(HMAC_SECRET, input));
    }

    if !request.options.is_empty() {
        builder = builder.insert(KEY_OPTIONS, request.options)?;
    }

    if let Some(token) = token {
        let auth_param = token.authenticate(request.client_data_hash.as_bytes());
        builder = builder
            .insert_bytes(KEY_PIN_UV_AUTH_PARAM, &auth_param)?
            .insert(KEY_PIN_UV_AUTH_PROTOCOL, token.protocol().as_u8())?;
    }

    let payload = device.transact(CtapCommand::GetAssertion, &builder.build()?)?;
    let (first, count) = Assertion::from_cbor(&payload, discoverable, session)?;

    let mut assertions = Vec::with_capacity(count as usize);
    assertions.push(first);

    for _ in 1..count {
        let payload = device.transact(CtapCommand::GetNextAssertion, &[])?;
        let (next, _) = Assertion::from_cbor(&payload, discoverable, session)?;
        assertions.push(next);
    }

    Ok(assertions)
}

/// Split authenticator data into its fixed header and extension outputs
///
/// Returns (rpIdHash, flags, signCount, extension map bytes). Assertion
/// authData never carries attested credential data, so anything past the
/// header must be the extension map.
fn parse_auth_data(auth_data: &[u8]) -> Result<([u8; 32], u8, u32, Option<Vec<u8>>)> {
    if auth_data.len() < AUTH_DATA_MIN_LEN {
        return Err(Error::Parse(CborError::Decode));
    }

    let mut rp_id_hash = [0u8; 32];
    rp_id_hash.copy_from_slice(&auth_data[..32]);

    let flags = auth_data[32];
    let sign_count = u32::from_be_bytes([auth_data[33], auth_data[34], auth_data[35], auth_data[36]]);

    if flags & FLAG_ATTESTED_CREDENTIAL_DATA != 0 {
        return Err(Error::Parse(CborError::Decode));
    }

    let extensions = if flags & FLAG_EXTENSION_DATA != 0 {
        let rest = &auth_data[AUTH_DATA_MIN_LEN..];
        if rest.is_empty() {
            return Err(Error::Parse(CborError::Decode));
        }
        Some(rest.to_vec())
    } else {
        if auth_data.len() != AUTH_DATA_MIN_LEN {
            return Err(Error::Parse(CborError::Decode));
        }
        None
    };

    Ok((rp_id_hash, flags, sign_count, extensions))
}

/// Pull one byte-string output from a text-keyed extension map
fn extension_output(extensions: &[u8], name: &str) -> Result<Option<Vec<u8>>> {
    let value: Value = cbor::decode(extensions).map_err(Error::Parse)?;
    let Value::Map(entries) = value else {
        return Err(Error::Parse(CborError::NotAMap));
    };

    for (key, value) in entries {
        if matches!(&key, Value::Text(t) if t == name) {
            let Value::Bytes(bytes) = value else {
                return Err(Error::Parse(CborError::Decode));
            };
            return Ok(Some(bytes));
        }
    }

    Ok(None)
}

/// A single-entry text-keyed map wrapping pre-encoded extension input
fn extension_input_map(name: &str, input: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + name.len() + input.len());
    out.push(0xa1);
    debug_assert!(name.len() <= 23);
    out.push(0x60 | name.len() as u8);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&input);
    out
}
