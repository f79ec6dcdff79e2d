//! CTAP wire data types
//!
//! Shared structures that cross the CBOR boundary. All of them serialize
//! with the field names the protocol uses on the wire.

use serde::{Deserialize, Serialize};

/// Relying Party information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParty {
    /// Relying party identifier (e.g. "example.com")
    pub id: String,

    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RelyingParty {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// User account entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User handle, an opaque identifier chosen by the relying party
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    /// Account name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            id,
            name: None,
            display_name: None,
        }
    }

    pub fn with_details(id: Vec<u8>, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            display_name: Some(display_name.into()),
        }
    }
}

/// Public key credential descriptor
///
/// Identifies one credential by type and ID, as used in allow lists and
/// credential management requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyCredentialDescriptor {
    /// Credential ID
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,

    /// Credential type, always "public-key" for FIDO2
    pub r#type: String,

    /// Transport hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<String>>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            id,
            r#type: "public-key".to_string(),
            transports: None,
        }
    }
}

/// COSE algorithm identifiers used in FIDO2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CoseAlgorithm {
    /// ES256 (ECDSA with P-256 and SHA-256)
    ES256 = -7,
    /// EdDSA
    EdDSA = -8,
    /// ES384 (ECDSA with P-384 and SHA-384)
    ES384 = -35,
    /// RS256 (RSASSA-PKCS1-v1_5 with SHA-256)
    RS256 = -257,
}

impl CoseAlgorithm {
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -7 => Some(Self::ES256),
            -8 => Some(Self::EdDSA),
            -35 => Some(Self::ES384),
            -257 => Some(Self::RS256),
            _ => None,
        }
    }
}

/// Credential protection policy reported per credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CredProtect {
    /// User verification optional
    UserVerificationOptional = 0x01,
    /// User verification optional with credential ID list
    UserVerificationOptionalWithCredentialIdList = 0x02,
    /// User verification required
    UserVerificationRequired = 0x03,
}

impl CredProtect {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::UserVerificationOptional),
            0x02 => Some(Self::UserVerificationOptionalWithCredentialIdList),
            0x03 => Some(Self::UserVerificationRequired),
            _ => None,
        }
    }
}
