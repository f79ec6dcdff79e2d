//! P-256 ECDSA (ES256) signature handling
//!
//! COSE algorithm identifier: -7 (ES256)
//! Spec: <https://www.rfc-editor.org/rfc/rfc8152.html#section-8.1>
//!
//! Assertions carry DER-encoded signatures over authData || clientDataHash.

use crate::error::{CryptoError, Result};

use p256::ecdsa::{Signature, SigningKey, VerifyingKey, signature::Signer, signature::Verifier};
use rand::rngs::OsRng;

/// Generate a new random ES256 key pair
///
/// Returns (private_key, public_key): a 32-byte scalar and a 65-byte
/// uncompressed SEC1 point (0x04 || x || y).
pub fn generate_keypair() -> ([u8; 32], Vec<u8>) {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = signing_key.verifying_key();

    let private_key: [u8; 32] = signing_key.to_bytes().into();
    let public_key = verifying_key.to_encoded_point(false).as_bytes().to_vec();

    (private_key, public_key)
}

/// Sign data with ES256, returning a DER-encoded signature
pub fn sign(private_key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| CryptoError::InvalidPrivateKey)?;

    let signature: Signature = signing_key.sign(data);
    Ok(signature.to_der().to_bytes().to_vec())
}

/// Verify a DER-encoded ES256 signature
///
/// The public key is a 65-byte uncompressed SEC1 point.
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    let verifying_key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;

    let sig = Signature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}
