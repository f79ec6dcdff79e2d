//! Credential management response types
//!
//! Parsers for the authenticatorCredentialManagement response maps. Each
//! type knows the integer keys of its map and pulls exactly what it needs;
//! unknown keys are ignored.

use crate::error::{Error, Result};
use fido2_client_ctap::cbor;
use fido2_client_ctap::types::{PublicKeyCredentialDescriptor, RelyingParty, User};
use fido2_client_ctap::{CborError, MapParser};

// CredentialManagement response keys
const KEY_EXISTING_COUNT: i32 = 0x01;
const KEY_MAX_REMAINING_COUNT: i32 = 0x02;
const KEY_RP: i32 = 0x03;
const KEY_RP_ID_HASH: i32 = 0x04;
const KEY_TOTAL_RPS: i32 = 0x05;
const KEY_USER: i32 = 0x06;
const KEY_CREDENTIAL_ID: i32 = 0x07;
const KEY_PUBLIC_KEY: i32 = 0x08;
const KEY_TOTAL_CREDENTIALS: i32 = 0x09;
const KEY_CRED_PROTECT: i32 = 0x0A;
const KEY_LARGE_BLOB_KEY: i32 = 0x0B;
const KEY_THIRD_PARTY_PAYMENT: i32 = 0x0C;

/// getCredsMetadata response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialsMetadata {
    /// Discoverable credentials currently stored
    pub existing_count: u64,

    /// Credentials the authenticator estimates it can still hold
    pub max_remaining_count: u64,
}

impl CredentialsMetadata {
    pub fn from_cbor(payload: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(payload)?;
        Ok(Self {
            existing_count: parser.get(KEY_EXISTING_COUNT)?,
            max_remaining_count: parser.get(KEY_MAX_REMAINING_COUNT)?,
        })
    }
}

/// One relying party from RP enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingPartyInfo {
    pub rp: RelyingParty,

    /// SHA-256 of the RP id, the key the authenticator indexes by
    pub rp_id_hash: [u8; 32],
}

impl RelyingPartyInfo {
    fn from_parser(parser: &MapParser) -> Result<Self> {
        let rp: RelyingParty = parser.get(KEY_RP)?;

        let hash_bytes = parser.get_bytes(KEY_RP_ID_HASH)?;
        let rp_id_hash: [u8; 32] = hash_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Parse(CborError::Decode))?;

        Ok(Self { rp, rp_id_hash })
    }

    /// Parse an enumerateRPsBegin response: first RP plus the total count
    pub fn from_begin_response(payload: &[u8]) -> Result<(Self, u64)> {
        let parser = MapParser::from_bytes(payload)?;
        let info = Self::from_parser(&parser)?;
        let total: u64 = parser.get(KEY_TOTAL_RPS)?;
        Ok((info, total))
    }

    /// Parse an enumerateRPsGetNextRP response
    pub fn from_next_response(payload: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(payload)?;
        Self::from_parser(&parser)
    }
}

/// One discoverable credential from credential enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidentCredential {
    pub user: User,
    pub credential_id: PublicKeyCredentialDescriptor,

    /// Credential public key as raw COSE_Key CBOR
    pub public_key: Vec<u8>,

    /// credProtect policy, when reported
    pub cred_protect: Option<u8>,

    /// Large blob encryption key, when the credential has one
    pub large_blob_key: Option<Vec<u8>>,

    pub third_party_payment: Option<bool>,
}

impl ResidentCredential {
    fn from_parser(parser: &MapParser) -> Result<Self> {
        let public_key = parser
            .get_raw(KEY_PUBLIC_KEY)
            .map(|value| cbor::encode(&value))
            .transpose()?
            .ok_or(Error::Parse(CborError::MissingKey(KEY_PUBLIC_KEY)))?;

        Ok(Self {
            user: parser.get(KEY_USER)?,
            credential_id: parser.get(KEY_CREDENTIAL_ID)?,
            public_key,
            cred_protect: parser.get_opt(KEY_CRED_PROTECT)?,
            large_blob_key: parser.get_bytes_opt(KEY_LARGE_BLOB_KEY)?,
            third_party_payment: parser.get_opt(KEY_THIRD_PARTY_PAYMENT)?,
        })
    }

    /// Parse an enumerateCredentialsBegin response: first credential plus
    /// the total count
    pub fn from_begin_response(payload: &[u8]) -> Result<(Self, u64)> {
        let parser = MapParser::from_bytes(payload)?;
        let credential = Self::from_parser(&parser)?;
        let total: u64 = parser.get(KEY_TOTAL_CREDENTIALS)?;
        Ok((credential, total))
    }

    /// Parse an enumerateCredentialsGetNextCredential response
    pub fn from_next_response(payload: &[u8]) -> Result<Self> {
        let parser = MapParser::from_bytes(payload)?;
        Self::from_parser(&parser)
    }
}
