//! Credential management flows over scripted wire traffic

mod common;

use common::{MockAuthenticator, MockHandle, MockHidDevice, open_device};

use fido2_client::credman;
use fido2_client::ctap::{MapBuilder, MapParser};
use fido2_client::pin::{PinToken, PinUvAuthProtocol, PinUvAuthSession, permissions};
use fido2_client::{Device, Error, PublicKeyCredentialDescriptor, RelyingParty, StatusCode, User};

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use std::cell::RefCell;
use std::rc::Rc;

type HmacSha256 = Hmac<Sha256>;

/// The token the authenticator model hands out
const TOKEN: [u8; 32] = [0xAB; 32];

fn setup_with_token() -> (Device<MockHidDevice>, MockHandle, PinToken) {
    let (mut device, handle) = open_device();

    let authenticator = Rc::new(RefCell::new(MockAuthenticator::new(2, "1234")));
    handle.set_responder(move |cmd, cbor| {
        if cmd == 0x06 {
            authenticator.borrow_mut().handle_client_pin(cbor)
        } else {
            vec![0x26] // unsupported: credman replies must come from the queue
        }
    });

    let session = PinUvAuthSession::establish(&mut device, PinUvAuthProtocol::V2).unwrap();
    let token = session
        .get_pin_token_with_permissions(
            &mut device,
            "1234",
            permissions::CREDENTIAL_MANAGEMENT,
            None,
        )
        .unwrap();

    (device, handle, token)
}

fn reference_auth_param(message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(&TOKEN).unwrap();
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn metadata_body(existing: u64, remaining: u64) -> Vec<u8> {
    MapBuilder::new()
        .insert(0x01, existing)
        .unwrap()
        .insert(0x02, remaining)
        .unwrap()
        .build()
        .unwrap()
}

fn rp_body(id: &str, total: Option<u64>) -> Vec<u8> {
    let hash: [u8; 32] = Sha256::digest(id.as_bytes()).into();
    let builder = MapBuilder::new()
        .insert(0x03, RelyingParty::with_name(id, id))
        .unwrap()
        .insert_bytes(0x04, &hash)
        .unwrap();
    match total {
        Some(t) => builder.insert(0x05, t).unwrap(),
        None => builder,
    }
    .build()
    .unwrap()
}

fn credential_body(user_id: u8, total: Option<u64>) -> Vec<u8> {
    let cose_key = MapBuilder::new()
        .insert(1, 2u8)
        .unwrap()
        .insert(3, -7i8)
        .unwrap()
        .build()
        .unwrap();

    let builder = MapBuilder::new()
        .insert(0x06, User::with_details(vec![user_id; 8], "user", "User"))
        .unwrap()
        .insert(
            0x07,
            PublicKeyCredentialDescriptor::new(vec![user_id; 16]),
        )
        .unwrap()
        .insert_raw(0x08, cose_key);
    match total {
        Some(t) => builder.insert(0x09, t).unwrap(),
        None => builder,
    }
    .build()
    .unwrap()
}

#[test]
fn metadata_decodes_wire_counts() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_ok(&metadata_body(18, 4));
    let metadata = credman::get_credentials_metadata(&mut device, &token).unwrap();
    assert_eq!(metadata.existing_count, 18);
    assert_eq!(metadata.max_remaining_count, 4);

    // The request carried subcommand 0x01 and a v2 MAC over just that byte
    let (_, request) = handle.requests().last().unwrap().clone();
    assert_eq!(request[0], 0x0A);
    let map = MapParser::from_bytes(&request[1..]).unwrap();
    assert_eq!(map.get::<u8>(0x01).unwrap(), 0x01);
    assert_eq!(map.get::<u8>(0x03).unwrap(), 2);
    assert_eq!(map.get_bytes(0x04).unwrap(), reference_auth_param(&[0x01]));
}

#[test]
fn metadata_is_idempotent_without_mutation() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_ok(&metadata_body(18, 4));
    handle.queue_ok(&metadata_body(18, 4));

    let first = credman::get_credentials_metadata(&mut device, &token).unwrap();
    let second = credman::get_credentials_metadata(&mut device, &token).unwrap();
    assert_eq!(first, second);
}

#[test]
fn enumerates_five_relying_parties_in_device_order() {
    let (mut device, handle, token) = setup_with_token();

    let ids = [
        "yubico.com",
        "yubikey.org",
        "webauthn.dev",
        "example.com",
        "fido.dev",
    ];
    handle.queue_ok(&rp_body(ids[0], Some(5)));
    for id in &ids[1..] {
        handle.queue_ok(&rp_body(id, None));
    }

    let requests_before = handle.requests().len();
    let rps = credman::enumerate_rps(&mut device, &token).unwrap();

    assert_eq!(rps.len(), 5);
    for (rp, id) in rps.iter().zip(ids) {
        assert_eq!(rp.rp.id, id);
        assert!(!rp.rp.id.is_empty());
        let expected: [u8; 32] = Sha256::digest(id.as_bytes()).into();
        assert_eq!(rp.rp_id_hash, expected);
    }

    // One begin plus four getNext transactions
    assert_eq!(handle.requests().len(), requests_before + 5);
}

#[test]
fn surplus_records_past_declared_count_are_discarded() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_ok(&rp_body("yubico.com", Some(2)));
    handle.queue_ok(&rp_body("yubikey.org", None));
    // The device would hand out a third record, but the count said two
    handle.queue_ok(&rp_body("phantom.example", None));

    let requests_before = handle.requests().len();
    let rps = credman::enumerate_rps(&mut device, &token).unwrap();

    assert_eq!(rps.len(), 2);
    assert_eq!(rps[1].rp.id, "yubikey.org");
    assert_eq!(handle.requests().len(), requests_before + 2);
}

#[test]
fn rp_enumeration_with_nothing_stored_is_empty() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_status(0x2E);
    let rps = credman::enumerate_rps(&mut device, &token).unwrap();
    assert!(rps.is_empty());
}

#[test]
fn enumerates_credentials_for_one_rp() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_ok(&credential_body(0x11, Some(2)));
    handle.queue_ok(&credential_body(0x22, None));

    let credentials = credman::enumerate_credentials(&mut device, "example.com", &token).unwrap();

    assert_eq!(credentials.len(), 2);
    assert_eq!(credentials[0].user.id, vec![0x11; 8]);
    assert_eq!(credentials[1].credential_id.id, vec![0x22; 16]);
    assert!(!credentials[0].public_key.is_empty());

    // The begin request scoped by rpIDHash and MACed subcommand || params
    let begin_request = &handle.requests()[handle.requests().len() - 2].1;
    let map = MapParser::from_bytes(&begin_request[1..]).unwrap();
    assert_eq!(map.get::<u8>(0x01).unwrap(), 0x04);

    let params = map.get_raw(0x02).expect("subcommand params");
    let params_map = MapParser::from_value(params).unwrap();
    let expected_hash: [u8; 32] = Sha256::digest(b"example.com").into();
    assert_eq!(params_map.get_bytes(0x01).unwrap(), expected_hash);
}

#[test]
fn credential_enumeration_with_nothing_stored_is_empty() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_status(0x2E);
    let credentials = credman::enumerate_credentials(&mut device, "example.com", &token).unwrap();
    assert!(credentials.is_empty());
}

#[test]
fn delete_credential_success_and_not_found() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_status(0x00);
    assert!(credman::delete_credential(&mut device, &[0xCC; 16], &token).is_ok());

    handle.queue_status(0x2E);
    let result = credman::delete_credential(&mut device, &[0xDD; 16], &token);
    assert!(matches!(
        result,
        Err(Error::Device(StatusCode::NoCredentials))
    ));
}

#[test]
fn stale_token_is_an_auth_error() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_status(0x38);
    let result = credman::get_credentials_metadata(&mut device, &token);
    assert!(matches!(
        result,
        Err(Error::Auth(StatusCode::PinTokenExpired))
    ));

    // The session itself stays usable for a fresh token
    handle.queue_ok(&metadata_body(1, 1));
    assert!(credman::get_credentials_metadata(&mut device, &token).is_ok());
}

#[test]
fn update_user_information_sends_new_user() {
    let (mut device, handle, token) = setup_with_token();

    handle.queue_status(0x00);
    let user = User::with_details(vec![0x11; 8], "new@example.com", "New Name");
    credman::update_user_information(&mut device, &[0x11; 16], &user, &token).unwrap();

    let (_, request) = handle.requests().last().unwrap().clone();
    let map = MapParser::from_bytes(&request[1..]).unwrap();
    assert_eq!(map.get::<u8>(0x01).unwrap(), 0x07);

    let params_map = MapParser::from_value(map.get_raw(0x02).unwrap()).unwrap();
    let sent_user: User = params_map.get(0x03).unwrap();
    assert_eq!(sent_user.name.as_deref(), Some("new@example.com"));
}
