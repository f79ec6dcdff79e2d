//! authenticatorCredentialManagement (0x0A)
//!
//! Enumerates, deletes and updates discoverable credentials. Every
//! subcommand that touches credential state is authenticated with a PIN/UV
//! auth token holding the credential management permission; the MAC covers
//! the subcommand byte followed by the encoded subcommand parameters.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::pin::PinToken;
use crate::response::{CredentialsMetadata, RelyingPartyInfo, ResidentCredential};

use fido2_client_ctap::types::{PublicKeyCredentialDescriptor, User};
use fido2_client_ctap::{CtapCommand, MapBuilder, StatusCode};
use fido2_client_transport::HidDevice;

use sha2::{Digest, Sha256};

// Request keys
const KEY_SUBCOMMAND: i32 = 0x01;
const KEY_SUBCOMMAND_PARAMS: i32 = 0x02;
const KEY_PIN_UV_AUTH_PROTOCOL: i32 = 0x03;
const KEY_PIN_UV_AUTH_PARAM: i32 = 0x04;

// Subcommand parameter keys
const PARAM_RP_ID_HASH: i32 = 0x01;
const PARAM_CREDENTIAL_ID: i32 = 0x02;
const PARAM_USER: i32 = 0x03;

// Subcommands
const SUB_GET_CREDS_METADATA: u8 = 0x01;
const SUB_ENUMERATE_RPS_BEGIN: u8 = 0x02;
const SUB_ENUMERATE_RPS_GET_NEXT: u8 = 0x03;
const SUB_ENUMERATE_CREDENTIALS_BEGIN: u8 = 0x04;
const SUB_ENUMERATE_CREDENTIALS_GET_NEXT: u8 = 0x05;
const SUB_DELETE_CREDENTIAL: u8 = 0x06;
const SUB_UPDATE_USER_INFORMATION: u8 = 0x07;

/// Credential slot usage (getCredsMetadata, 0x01)
pub fn get_credentials_metadata<D: HidDevice>(
    device: &mut Device<D>,
    token: &PinToken,
) -> Result<CredentialsMetadata> {
    let payload = authenticated_request(device, token, SUB_GET_CREDS_METADATA, None)?;
    CredentialsMetadata::from_cbor(&payload)
}

/// Enumerate every relying party with discoverable credentials
///
/// Only the begin subcommand is authenticated; getNextRP continues the
/// iteration the authenticator set up. An authenticator with nothing stored
/// answers NO_CREDENTIALS, which comes back as an empty list. The
/// authenticator's declared total bounds the iteration, so surplus records
/// it would still hand out are left unread.
pub fn enumerate_rps<D: HidDevice>(
    device: &mut Device<D>,
    token: &PinToken,
) -> Result<Vec<RelyingPartyInfo>> {
    let payload = match authenticated_request(device, token, SUB_ENUMERATE_RPS_BEGIN, None) {
        Err(Error::Device(StatusCode::NoCredentials)) => return Ok(Vec::new()),
        other => other?,
    };

    let (first, total) = RelyingPartyInfo::from_begin_response(&payload)?;
    let mut rps = Vec::with_capacity(total as usize);
    rps.push(first);

    for _ in 1..total {
        let payload = plain_request(device, SUB_ENUMERATE_RPS_GET_NEXT)?;
        rps.push(RelyingPartyInfo::from_next_response(&payload)?);
    }

    Ok(rps)
}

/// Enumerate the discoverable credentials for one relying party
pub fn enumerate_credentials<D: HidDevice>(
    device: &mut Device<D>,
    rp_id: &str,
    token: &PinToken,
) -> Result<Vec<ResidentCredential>> {
    let rp_id_hash: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();

    let params = MapBuilder::new()
        .insert_bytes(PARAM_RP_ID_HASH, &rp_id_hash)?
        .build()?;

    let payload = match authenticated_request(
        device,
        token,
        SUB_ENUMERATE_CREDENTIALS_BEGIN,
        Some(params),
    ) {
        Err(Error::Device(StatusCode::NoCredentials)) => return Ok(Vec::new()),
        other => other?,
    };

    let (first, total) = ResidentCredential::from_begin_response(&payload)?;
    let mut credentials = Vec::with_capacity(total as usize);
    credentials.push(first);

    for _ in 1..total {
        let payload = plain_request(device, SUB_ENUMERATE_CREDENTIALS_GET_NEXT)?;
        credentials.push(ResidentCredential::from_next_response(&payload)?);
    }

    Ok(credentials)
}

/// Delete one discoverable credential by id
pub fn delete_credential<D: HidDevice>(
    device: &mut Device<D>,
    credential_id: &[u8],
    token: &PinToken,
) -> Result<()> {
    let params = MapBuilder::new()
        .insert(
            PARAM_CREDENTIAL_ID,
            PublicKeyCredentialDescriptor::new(credential_id.to_vec()),
        )?
        .build()?;

    authenticated_request(device, token, SUB_DELETE_CREDENTIAL, Some(params))?;
    Ok(())
}

/// Replace the user entity stored with a credential
pub fn update_user_information<D: HidDevice>(
    device: &mut Device<D>,
    credential_id: &[u8],
    user: &User,
    token: &PinToken,
) -> Result<()> {
    let params = MapBuilder::new()
        .insert(
            PARAM_CREDENTIAL_ID,
            PublicKeyCredentialDescriptor::new(credential_id.to_vec()),
        )?
        .insert(PARAM_USER, user)?
        .build()?;

    authenticated_request(device, token, SUB_UPDATE_USER_INFORMATION, Some(params))?;
    Ok(())
}

/// One authenticated subcommand round trip
///
/// pinUvAuthParam = authenticate(token, subcommand || params), with the
/// params bytes exactly as they appear in the request map.
fn authenticated_request<D: HidDevice>(
    device: &mut Device<D>,
    token: &PinToken,
    subcommand: u8,
    params: Option<Vec<u8>>,
) -> Result<Vec<u8>> {
    let mut message = Vec::with_capacity(1 + params.as_ref().map_or(0, Vec::len));
    message.push(subcommand);
    if let Some(ref p) = params {
        message.extend_from_slice(p);
    }
    let auth_param = token.authenticate(&message);

    let mut builder = MapBuilder::new().insert(KEY_SUBCOMMAND, subcommand)?;
    if let Some(p) = params {
        builder = builder.insert_raw(KEY_SUBCOMMAND_PARAMS, p);
    }
    let request = builder
        .insert(KEY_PIN_UV_AUTH_PROTOCOL, token.protocol().as_u8())?
        .insert_bytes(KEY_PIN_UV_AUTH_PARAM, &auth_param)?
        .build()?;

    device.transact(CtapCommand::CredentialManagement, &request)
}

/// One unauthenticated getNext round trip
fn plain_request<D: HidDevice>(device: &mut Device<D>, subcommand: u8) -> Result<Vec<u8>> {
    let request = MapBuilder::new().insert(KEY_SUBCOMMAND, subcommand)?.build()?;
    device.transact(CtapCommand::CredentialManagement, &request)
}
