//! CTAP2 protocol plumbing for the client side
//!
//! This crate holds the pieces every CTAP2 conversation needs:
//! - Canonical CBOR encoding and map handling
//! - Command and status code tables
//! - Wire data types shared across requests and responses
//!
//! Implements the relevant parts of the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html>

pub mod cbor;
pub mod command;
pub mod status;
pub mod types;

pub use cbor::{CborError, MapBuilder, MapParser, StackBuffer, Value, MAX_CTAP_MESSAGE_SIZE};
pub use command::CtapCommand;
pub use status::StatusCode;
pub use types::{
    CoseAlgorithm, CredProtect, PublicKeyCredentialDescriptor, RelyingParty, User,
};
