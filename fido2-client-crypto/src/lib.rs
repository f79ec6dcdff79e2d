//! Cryptographic primitives for the FIDO2 client
//!
//! Everything a platform needs to talk the CTAP PIN protocol and check
//! assertion signatures:
//!
//! - **ECDH**: P-256 key agreement with the authenticator
//! - **PIN Protocols**: V1 and V2 key derivation, encryption and MACs
//! - **ECDSA**: ES256 signature verification
//!
//! All implementations follow the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html>

pub mod ecdh;
pub mod ecdsa;
pub mod error;
pub mod pin_protocol;

pub use ecdh::KeyPair;
pub use error::{CryptoError, Result};
pub use pin_protocol::pin_hash;
