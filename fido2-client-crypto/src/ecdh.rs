//! P-256 ECDH for CTAP PIN protocol key agreement
//!
//! Implements the platform side of key agreement per the FIDO2 spec:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#sctn-pin-protocol>

use crate::error::{CryptoError, Result};

use p256::{PublicKey, SecretKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;

/// Ephemeral P-256 key pair for ECDH key agreement
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS RNG
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Public key as COSE coordinates
    ///
    /// Returns (x, y) as two 32-byte arrays, the form CTAP uses inside a
    /// COSE_Key map (kty: 2, alg: -25, crv: 1).
    pub fn public_key_cose(&self) -> ([u8; 32], [u8; 32]) {
        let point = self.public.to_encoded_point(false);
        let x = point.x().expect("uncompressed point has x coordinate");
        let y = point.y().expect("uncompressed point has y coordinate");

        let mut x_bytes = [0u8; 32];
        let mut y_bytes = [0u8; 32];
        x_bytes.copy_from_slice(&x[..]);
        y_bytes.copy_from_slice(&y[..]);

        (x_bytes, y_bytes)
    }

    /// Public key in uncompressed SEC1 format (0x04 || x || y)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    /// Compute the ECDH shared secret with a peer public key
    ///
    /// The peer key must be in uncompressed SEC1 format (65 bytes). The
    /// returned value is the x-coordinate of the shared point, the "Z" the
    /// PIN protocol KDFs consume.
    pub fn shared_secret(&self, peer_public_key: &[u8]) -> Result<[u8; 32]> {
        let peer_public = PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let shared =
            p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), peer_public.as_affine());

        let mut secret = [0u8; 32];
        secret.copy_from_slice(shared.raw_secret_bytes());
        Ok(secret)
    }

    /// Build a key pair from an existing secret scalar
    pub fn from_bytes(secret_bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_bytes(secret_bytes.into())
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }
}

/// Assemble an uncompressed SEC1 public key from COSE coordinates
pub fn sec1_from_cose(x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
    if x.len() != 32 || y.len() != 32 {
        return Err(CryptoError::InvalidCoseKey);
    }
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(x);
    sec1.extend_from_slice(y);
    Ok(sec1)
}
