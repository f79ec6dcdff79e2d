//! Request parameter types
//!
//! Thin typed wrappers over what ends up in the CTAP2 request maps. Builders
//! follow the WebAuthn shape: required fields in `new`, everything else
//! through chainable `with_` setters.

use crate::error::{Error, Result};
use fido2_client_ctap::types::PublicKeyCredentialDescriptor;

use serde::Serialize;

/// SHA-256 hash of the serialized client data, always 32 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDataHash([u8; 32]);

impl ClientDataHash {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let hash: [u8; 32] = data
            .try_into()
            .map_err(|_| Error::InvalidParameter("client data hash must be 32 bytes"))?;
        Ok(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ClientDataHash {
    fn from(hash: [u8; 32]) -> Self {
        Self(hash)
    }
}

/// getAssertion option map ({"up": ..., "uv": ...})
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssertionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv: Option<bool>,
}

impl AssertionOptions {
    pub fn is_empty(&self) -> bool {
        self.up.is_none() && self.uv.is_none()
    }
}

/// Parameters for authenticatorGetAssertion (0x02)
#[derive(Debug, Clone)]
pub struct GetAssertionRequest {
    pub rp_id: String,
    pub client_data_hash: ClientDataHash,
    /// Credentials the caller will accept; empty means any discoverable
    /// credential for the RP
    pub allow_list: Vec<PublicKeyCredentialDescriptor>,
    pub options: AssertionOptions,
    /// Salts for the hmac-secret extension, one or two 32-byte values
    pub hmac_salts: Vec<[u8; 32]>,
}

impl GetAssertionRequest {
    pub fn new(rp_id: impl Into<String>, client_data_hash: ClientDataHash) -> Self {
        Self {
            rp_id: rp_id.into(),
            client_data_hash,
            allow_list: Vec::new(),
            options: AssertionOptions { up: None, uv: None },
            hmac_salts: Vec::new(),
        }
    }

    pub fn with_allow_list(mut self, allow_list: Vec<PublicKeyCredentialDescriptor>) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_credential(mut self, credential_id: Vec<u8>) -> Self {
        self.allow_list
            .push(PublicKeyCredentialDescriptor::new(credential_id));
        self
    }

    pub fn with_user_presence(mut self, up: bool) -> Self {
        self.options.up = Some(up);
        self
    }

    pub fn with_user_verification(mut self, uv: bool) -> Self {
        self.options.uv = Some(uv);
        self
    }

    /// Request an hmac-secret output for one salt
    pub fn with_hmac_salt(mut self, salt: [u8; 32]) -> Self {
        self.hmac_salts.push(salt);
        self
    }

    /// Request hmac-secret outputs for two salts in one assertion
    pub fn with_hmac_salts(mut self, salt1: [u8; 32], salt2: [u8; 32]) -> Self {
        self.hmac_salts.push(salt1);
        self.hmac_salts.push(salt2);
        self
    }
}
