//! authenticatorGetInfo response
//!
//! Parsed once when the device is opened and kept on the session so callers
//! can check versions, options and PIN protocol support without another
//! round trip.

use crate::error::{Error, Result};
use fido2_client_ctap::{CborError, MapParser};

use std::collections::BTreeMap;

const KEY_VERSIONS: i32 = 0x01;
const KEY_EXTENSIONS: i32 = 0x02;
const KEY_AAGUID: i32 = 0x03;
const KEY_OPTIONS: i32 = 0x04;
const KEY_MAX_MSG_SIZE: i32 = 0x05;
const KEY_PIN_UV_AUTH_PROTOCOLS: i32 = 0x06;

/// Authenticator capabilities reported by authenticatorGetInfo (0x04)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Supported protocol versions, e.g. "FIDO_2_0", "FIDO_2_1", "U2F_V2"
    pub versions: Vec<String>,

    /// Supported extensions, e.g. "hmac-secret", "credProtect"
    pub extensions: Vec<String>,

    /// Authenticator attestation GUID
    pub aaguid: [u8; 16],

    /// Option map, e.g. {"rk": true, "clientPin": true, "credMgmt": true}
    pub options: BTreeMap<String, bool>,

    /// Maximum CTAP message size the authenticator accepts
    pub max_msg_size: Option<u64>,

    /// Supported PIN/UV auth protocol versions, in order of preference
    pub pin_uv_auth_protocols: Vec<u64>,
}

impl DeviceInfo {
    pub fn from_cbor(payload: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(payload)?;

        let versions: Vec<String> = parser.get(KEY_VERSIONS)?;
        let extensions: Vec<String> = parser.get_opt(KEY_EXTENSIONS)?.unwrap_or_default();

        let aaguid_bytes = parser.get_bytes(KEY_AAGUID)?;
        let aaguid: [u8; 16] = aaguid_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Parse(CborError::Decode))?;

        let options: BTreeMap<String, bool> = parser.get_opt(KEY_OPTIONS)?.unwrap_or_default();
        let max_msg_size: Option<u64> = parser.get_opt(KEY_MAX_MSG_SIZE)?;
        let pin_uv_auth_protocols: Vec<u64> = parser
            .get_opt(KEY_PIN_UV_AUTH_PROTOCOLS)?
            .unwrap_or_default();

        Ok(Self {
            versions,
            extensions,
            aaguid,
            options,
            max_msg_size,
            pin_uv_auth_protocols,
        })
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn supports_extension(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    /// Option value, or `None` when the authenticator does not report it
    pub fn option(&self, name: &str) -> Option<bool> {
        self.options.get(name).copied()
    }

    pub fn supports_pin_uv_auth_protocol(&self, version: u64) -> bool {
        self.pin_uv_auth_protocols.contains(&version)
    }
}
