//! authenticatorClientPIN (0x06) and PIN/UV auth tokens
//!
//! The platform establishes an ECDH shared secret with the authenticator,
//! then uses it to send the PIN hash encrypted and receive a PIN/UV auth
//! token back. The token authenticates later requests (getAssertion,
//! credential management) without retransmitting the PIN.
//!
//! Key material lives in zeroizing buffers and is never logged or persisted.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorClientPIN>

use crate::device::Device;
use crate::error::{Error, Result};
use crate::info::DeviceInfo;

use fido2_client_crypto::ecdh::{KeyPair, sec1_from_cose};
use fido2_client_crypto::pin_protocol::{pin_hash, v1, v2};
use fido2_client_ctap::{CtapCommand, MapBuilder, MapParser};
use fido2_client_transport::HidDevice;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

// ClientPin request keys
const KEY_PROTOCOL: i32 = 0x01;
const KEY_SUBCOMMAND: i32 = 0x02;
const KEY_KEY_AGREEMENT: i32 = 0x03;
const KEY_PIN_UV_AUTH_PARAM: i32 = 0x04;
const KEY_NEW_PIN_ENC: i32 = 0x05;
const KEY_PIN_HASH_ENC: i32 = 0x06;
const KEY_PERMISSIONS: i32 = 0x09;
const KEY_RP_ID: i32 = 0x0A;

// ClientPin response keys
const RESP_KEY_AGREEMENT: i32 = 0x01;
const RESP_PIN_UV_AUTH_TOKEN: i32 = 0x02;
const RESP_PIN_RETRIES: i32 = 0x03;

// ClientPin subcommands
const SUB_GET_PIN_RETRIES: u8 = 0x01;
const SUB_GET_KEY_AGREEMENT: u8 = 0x02;
const SUB_SET_PIN: u8 = 0x03;
const SUB_CHANGE_PIN: u8 = 0x04;
const SUB_GET_PIN_TOKEN: u8 = 0x05;
const SUB_GET_PIN_TOKEN_WITH_PERMISSIONS: u8 = 0x09;

// COSE_Key labels for the P-256 ECDH key
const COSE_KTY: i32 = 1;
const COSE_ALG: i32 = 3;
const COSE_CRV: i32 = -1;
const COSE_X: i32 = -2;
const COSE_Y: i32 = -3;

/// Padded PIN buffer length for setPIN/changePIN
const PIN_PAD_LEN: usize = 64;

type HmacSha256 = Hmac<Sha256>;

/// PIN/UV auth token permission flags
pub mod permissions {
    pub const MAKE_CREDENTIAL: u8 = 0x01;
    pub const GET_ASSERTION: u8 = 0x02;
    pub const CREDENTIAL_MANAGEMENT: u8 = 0x04;
    pub const BIO_ENROLLMENT: u8 = 0x08;
    pub const LARGE_BLOB_WRITE: u8 = 0x10;
    pub const AUTHENTICATOR_CONFIGURATION: u8 = 0x20;
}

/// PIN/UV auth protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinUvAuthProtocol {
    V1,
    V2,
}

impl PinUvAuthProtocol {
    pub fn as_u8(self) -> u8 {
        match self {
            PinUvAuthProtocol::V1 => 1,
            PinUvAuthProtocol::V2 => 2,
        }
    }

    /// Pick the authenticator's preferred protocol from getInfo
    pub fn select(info: &DeviceInfo) -> Option<Self> {
        info.pin_uv_auth_protocols
            .iter()
            .find_map(|&p| match p {
                1 => Some(PinUvAuthProtocol::V1),
                2 => Some(PinUvAuthProtocol::V2),
                _ => None,
            })
    }
}

/// How many PIN attempts remain before the authenticator locks
pub fn get_pin_retries<D: HidDevice>(device: &mut Device<D>) -> Result<u64> {
    let request = MapBuilder::new()
        .insert(KEY_PROTOCOL, 1u8)?
        .insert(KEY_SUBCOMMAND, SUB_GET_PIN_RETRIES)?
        .build()?;

    let payload = device.transact(CtapCommand::ClientPin, &request)?;
    let parser = MapParser::from_bytes(&payload)?;
    Ok(parser.get(RESP_PIN_RETRIES)?)
}

/// An established key agreement with one authenticator
///
/// Holds the platform's ephemeral key pair and the derived shared secret.
/// The secret zeroes itself on drop; sessions are never reused across
/// device reopens.
pub struct PinUvAuthSession {
    protocol: PinUvAuthProtocol,
    platform_key: KeyPair,
    shared_secret: Zeroizing<[u8; 32]>,
}

impl PinUvAuthSession {
    /// Run getKeyAgreement and derive the shared secret
    pub fn establish<D: HidDevice>(
        device: &mut Device<D>,
        protocol: PinUvAuthProtocol,
    ) -> Result<Self> {
        let request = MapBuilder::new()
            .insert(KEY_PROTOCOL, protocol.as_u8())?
            .insert(KEY_SUBCOMMAND, SUB_GET_KEY_AGREEMENT)?
            .build()?;

        let payload = device.transact(CtapCommand::ClientPin, &request)?;
        let parser = MapParser::from_bytes(&payload)?;

        let cose_key = parser
            .get_raw(RESP_KEY_AGREEMENT)
            .ok_or(Error::Parse(fido2_client_ctap::CborError::MissingKey(
                RESP_KEY_AGREEMENT,
            )))?;
        let cose = MapParser::from_value(cose_key)?;

        let x = cose.get_bytes(COSE_X)?;
        let y = cose.get_bytes(COSE_Y)?;
        let peer_public = sec1_from_cose(&x, &y)?;

        let platform_key = KeyPair::generate();
        let shared_secret = Zeroizing::new(platform_key.shared_secret(&peer_public)?);

        Ok(Self {
            protocol,
            platform_key,
            shared_secret,
        })
    }

    pub fn protocol(&self) -> PinUvAuthProtocol {
        self.protocol
    }

    /// Exchange the PIN for a PIN/UV auth token (getPinToken, 0x05)
    pub fn get_pin_token<D: HidDevice>(
        &self,
        device: &mut Device<D>,
        pin: &str,
    ) -> Result<PinToken> {
        let request = MapBuilder::new()
            .insert(KEY_PROTOCOL, self.protocol.as_u8())?
            .insert(KEY_SUBCOMMAND, SUB_GET_PIN_TOKEN)?
            .insert_raw(KEY_KEY_AGREEMENT, self.platform_cose_key()?)
            .insert_bytes(KEY_PIN_HASH_ENC, &self.encrypt_pin_hash(pin)?)?
            .build()?;

        self.decrypt_token_response(device, &request)
    }

    /// Exchange the PIN for a permission-scoped token (0x09)
    ///
    /// `permissions` is a bitmask from the [`permissions`] module. The RP id
    /// binds assertion and credential management permissions to one site.
    pub fn get_pin_token_with_permissions<D: HidDevice>(
        &self,
        device: &mut Device<D>,
        pin: &str,
        permissions: u8,
        rp_id: Option<&str>,
    ) -> Result<PinToken> {
        if permissions == 0 {
            return Err(Error::InvalidParameter("permissions bitmask is empty"));
        }

        let request = MapBuilder::new()
            .insert(KEY_PROTOCOL, self.protocol.as_u8())?
            .insert(KEY_SUBCOMMAND, SUB_GET_PIN_TOKEN_WITH_PERMISSIONS)?
            .insert_raw(KEY_KEY_AGREEMENT, self.platform_cose_key()?)
            .insert_bytes(KEY_PIN_HASH_ENC, &self.encrypt_pin_hash(pin)?)?
            .insert(KEY_PERMISSIONS, permissions)?
            .insert_opt(KEY_RP_ID, rp_id)?
            .build()?;

        self.decrypt_token_response(device, &request)
    }

    /// Set the PIN on an authenticator that has none (setPIN, 0x03)
    pub fn set_pin<D: HidDevice>(&self, device: &mut Device<D>, new_pin: &str) -> Result<()> {
        let padded = pad_pin(new_pin)?;
        let new_pin_enc = self.encrypt(&padded[..])?;
        let auth_param = self.authenticate(&new_pin_enc);

        let request = MapBuilder::new()
            .insert(KEY_PROTOCOL, self.protocol.as_u8())?
            .insert(KEY_SUBCOMMAND, SUB_SET_PIN)?
            .insert_raw(KEY_KEY_AGREEMENT, self.platform_cose_key()?)
            .insert_bytes(KEY_PIN_UV_AUTH_PARAM, &auth_param)?
            .insert_bytes(KEY_NEW_PIN_ENC, &new_pin_enc)?
            .build()?;

        device.transact(CtapCommand::ClientPin, &request)?;
        Ok(())
    }

    /// Change an existing PIN (changePIN, 0x04)
    pub fn change_pin<D: HidDevice>(
        &self,
        device: &mut Device<D>,
        current_pin: &str,
        new_pin: &str,
    ) -> Result<()> {
        let padded = pad_pin(new_pin)?;
        let new_pin_enc = self.encrypt(&padded[..])?;
        let pin_hash_enc = self.encrypt_pin_hash(current_pin)?;

        // MAC covers newPinEnc || pinHashEnc
        let mut message = Vec::with_capacity(new_pin_enc.len() + pin_hash_enc.len());
        message.extend_from_slice(&new_pin_enc);
        message.extend_from_slice(&pin_hash_enc);
        let auth_param = self.authenticate(&message);

        let request = MapBuilder::new()
            .insert(KEY_PROTOCOL, self.protocol.as_u8())?
            .insert(KEY_SUBCOMMAND, SUB_CHANGE_PIN)?
            .insert_raw(KEY_KEY_AGREEMENT, self.platform_cose_key()?)
            .insert_bytes(KEY_PIN_UV_AUTH_PARAM, &auth_param)?
            .insert_bytes(KEY_NEW_PIN_ENC, &new_pin_enc)?
            .insert_bytes(KEY_PIN_HASH_ENC, &pin_hash_enc)?
            .build()?;

        device.transact(CtapCommand::ClientPin, &request)?;
        Ok(())
    }

    /// Build the hmac-secret extension input for one or two salts
    ///
    /// `salts` is 32 bytes for one salt or 64 bytes for two. Returns the
    /// extension input map ready to embed under "hmac-secret".
    pub fn wrap_hmac_salt(&self, salts: &[u8]) -> Result<Vec<u8>> {
        if salts.len() != 32 && salts.len() != 64 {
            return Err(Error::InvalidParameter("hmac-secret salts must be 32 or 64 bytes"));
        }

        let salt_enc = self.encrypt(salts)?;
        let salt_auth = self.authenticate(&salt_enc);

        let builder = MapBuilder::new()
            .insert_raw(1, self.platform_cose_key()?)
            .insert_bytes(2, &salt_enc)?
            .insert_bytes(3, &salt_auth)?;

        // Field 4 defaults to protocol 1 when absent
        let builder = match self.protocol {
            PinUvAuthProtocol::V1 => builder,
            PinUvAuthProtocol::V2 => builder.insert(4, 2u8)?,
        };

        Ok(builder.build()?)
    }

    /// Decrypt the hmac-secret extension output
    ///
    /// Returns 32 or 64 bytes matching the salt count of the request.
    pub fn unwrap_hmac_secret(&self, output: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let secret = Zeroizing::new(self.decrypt(output)?);
        if secret.len() != 32 && secret.len() != 64 {
            return Err(Error::InvalidParameter("hmac-secret output must be 32 or 64 bytes"));
        }
        Ok(secret)
    }

    /// Platform public key as a canonical COSE_Key map
    fn platform_cose_key(&self) -> Result<Vec<u8>> {
        let (x, y) = self.platform_key.public_key_cose();
        Ok(MapBuilder::new()
            .insert(COSE_KTY, 2u8)? // EC2
            .insert(COSE_ALG, -25i8)? // ECDH-ES + HKDF-256
            .insert(COSE_CRV, 1u8)? // P-256
            .insert_bytes(COSE_X, &x)?
            .insert_bytes(COSE_Y, &y)?
            .build()?)
    }

    fn encrypt_pin_hash(&self, pin: &str) -> Result<Vec<u8>> {
        let hash = pin_hash(pin);
        self.encrypt(&hash[..])
    }

    fn decrypt_token_response<D: HidDevice>(
        &self,
        device: &mut Device<D>,
        request: &[u8],
    ) -> Result<PinToken> {
        let payload = device.transact(CtapCommand::ClientPin, request)?;
        let parser = MapParser::from_bytes(&payload)?;

        let token_enc = parser.get_bytes(RESP_PIN_UV_AUTH_TOKEN)?;
        let token = Zeroizing::new(self.decrypt(&token_enc)?);

        if token.is_empty() || token.len() % 16 != 0 {
            return Err(Error::InvalidParameter("PIN/UV auth token has invalid length"));
        }

        Ok(PinToken {
            secret: token,
            protocol: self.protocol,
        })
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(match self.protocol {
            PinUvAuthProtocol::V1 => {
                let key = Zeroizing::new(v1::derive_key(&self.shared_secret));
                v1::encrypt(&key, plaintext)?
            }
            PinUvAuthProtocol::V2 => {
                let key = Zeroizing::new(v2::derive_aes_key(&self.shared_secret));
                v2::encrypt(&key, plaintext)?
            }
        })
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(match self.protocol {
            PinUvAuthProtocol::V1 => {
                let key = Zeroizing::new(v1::derive_key(&self.shared_secret));
                v1::decrypt(&key, ciphertext)?
            }
            PinUvAuthProtocol::V2 => {
                let key = Zeroizing::new(v2::derive_aes_key(&self.shared_secret));
                v2::decrypt(&key, ciphertext)?
            }
        })
    }

    /// MAC over `data` with the shared-secret HMAC key, sized per protocol
    fn authenticate(&self, data: &[u8]) -> Vec<u8> {
        match self.protocol {
            PinUvAuthProtocol::V1 => {
                let key = Zeroizing::new(v1::derive_key(&self.shared_secret));
                v1::authenticate(&key, data).to_vec()
            }
            PinUvAuthProtocol::V2 => {
                let key = Zeroizing::new(v2::derive_hmac_key(&self.shared_secret));
                v2::authenticate(&key, data).to_vec()
            }
        }
    }
}

/// A decrypted PIN/UV auth token
///
/// Signs request payloads so the authenticator can tie them to the PIN
/// ceremony. Zeroes itself on drop.
pub struct PinToken {
    secret: Zeroizing<Vec<u8>>,
    protocol: PinUvAuthProtocol,
}

impl PinToken {
    pub fn protocol(&self) -> PinUvAuthProtocol {
        self.protocol
    }

    /// pinUvAuthParam over a message: HMAC-SHA-256 keyed by the token,
    /// truncated to 16 bytes for protocol 1, full 32 bytes for protocol 2
    pub fn authenticate(&self, message: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(message);
        let full = mac.finalize().into_bytes();

        match self.protocol {
            PinUvAuthProtocol::V1 => full[..16].to_vec(),
            PinUvAuthProtocol::V2 => full.to_vec(),
        }
    }
}

/// Pad a new PIN to the fixed 64-byte buffer CTAP encrypts
fn pad_pin(pin: &str) -> Result<Zeroizing<[u8; PIN_PAD_LEN]>> {
    if pin.chars().count() < 4 {
        return Err(Error::InvalidParameter("PIN must be at least 4 characters"));
    }
    if pin.len() > 63 {
        return Err(Error::InvalidParameter("PIN must be at most 63 bytes"));
    }

    let mut padded = Zeroizing::new([0u8; PIN_PAD_LEN]);
    padded[..pin.len()].copy_from_slice(pin.as_bytes());
    Ok(padded)
}
