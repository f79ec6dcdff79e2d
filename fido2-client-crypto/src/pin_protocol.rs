//! PIN/UV authentication protocols (V1 and V2), platform side
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#pinProto1>
//!
//! Protocol V1: single SHA-256 derived key, zero-IV AES-256-CBC, 16-byte MACs.
//! Protocol V2: HKDF-separated AES and HMAC keys, random-IV AES-256-CBC with
//! the IV prepended to the ciphertext, full 32-byte MACs.
//!
//! Neither protocol pads: every plaintext handed to `encrypt` must already be
//! a multiple of the AES block size.

use crate::error::{CryptoError, Result};

use aes::Aes256;
use cbc::{
    Decryptor, Encryptor,
    cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding},
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// Hash a PIN for transport: the left 16 bytes of SHA-256(pin)
///
/// This is what gets encrypted into pinHashEnc. The buffer zeroes itself
/// on drop.
pub fn pin_hash(pin: &str) -> Zeroizing<[u8; 16]> {
    let digest = Sha256::digest(pin.as_bytes());
    let mut out = Zeroizing::new([0u8; 16]);
    out.copy_from_slice(&digest[..16]);
    out
}

fn hmac_sha256(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// PIN Protocol Version 1
pub mod v1 {
    use super::*;

    /// Derive the session key from the ECDH shared secret
    ///
    /// V1 uses SHA-256(Z) as both the AES and the HMAC key.
    pub fn derive_key(shared_secret: &[u8; 32]) -> [u8; 32] {
        Sha256::digest(shared_secret).into()
    }

    /// AES-256-CBC encrypt with a zero IV
    ///
    /// The plaintext must be block-aligned.
    pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() % 16 != 0 {
            return Err(CryptoError::EncryptionFailed);
        }

        let iv = [0u8; 16];
        let mut buffer = plaintext.to_vec();
        let len = buffer.len();

        let cipher = Aes256CbcEnc::new(key.into(), &iv.into());
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(buffer)
    }

    /// AES-256-CBC decrypt with a zero IV
    pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(CryptoError::DecryptionFailed);
        }

        let iv = [0u8; 16];
        let mut buffer = ciphertext.to_vec();

        let cipher = Aes256CbcDec::new(key.into(), &iv.into());
        let len = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| CryptoError::DecryptionFailed)?
            .len();

        buffer.truncate(len);
        Ok(buffer)
    }

    /// pinUvAuthParam: the first 16 bytes of HMAC-SHA-256
    pub fn authenticate(key: &[u8; 32], data: &[u8]) -> [u8; 16] {
        let full = hmac_sha256(key, data);
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    }

    /// Constant-time MAC check
    pub fn verify(key: &[u8; 32], data: &[u8], expected: &[u8; 16]) -> bool {
        let computed = authenticate(key, data);
        computed.ct_eq(expected).into()
    }
}

/// PIN Protocol Version 2
pub mod v2 {
    use super::*;

    /// Derive the HMAC key: HKDF-SHA-256(salt=zeros, Z, "CTAP2 HMAC key")
    pub fn derive_hmac_key(shared_secret: &[u8; 32]) -> [u8; 32] {
        hkdf_expand(shared_secret, b"CTAP2 HMAC key")
    }

    /// Derive the AES key: HKDF-SHA-256(salt=zeros, Z, "CTAP2 AES key")
    pub fn derive_aes_key(shared_secret: &[u8; 32]) -> [u8; 32] {
        hkdf_expand(shared_secret, b"CTAP2 AES key")
    }

    fn hkdf_expand(shared_secret: &[u8; 32], info: &[u8]) -> [u8; 32] {
        use hkdf::Hkdf;

        let salt = [0u8; 32];
        let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
        let mut key = [0u8; 32];
        hkdf.expand(info, &mut key)
            .expect("32 bytes is a valid HKDF-SHA-256 output length");
        key
    }

    /// AES-256-CBC encrypt with a fresh random IV prepended to the output
    ///
    /// Output layout: IV (16 bytes) || ciphertext. The plaintext must be
    /// block-aligned.
    pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() % 16 != 0 {
            return Err(CryptoError::EncryptionFailed);
        }

        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);

        let mut output = vec![0u8; 16 + plaintext.len()];
        output[..16].copy_from_slice(&iv);
        output[16..].copy_from_slice(plaintext);

        let len = plaintext.len();
        let cipher = Aes256CbcEnc::new(key.into(), &iv.into());
        cipher
            .encrypt_padded_mut::<NoPadding>(&mut output[16..], len)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(output)
    }

    /// AES-256-CBC decrypt expecting the IV in the first 16 bytes
    pub fn decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 32 || (ciphertext.len() - 16) % 16 != 0 {
            return Err(CryptoError::DecryptionFailed);
        }

        let mut iv = [0u8; 16];
        iv.copy_from_slice(&ciphertext[..16]);

        let mut buffer = ciphertext[16..].to_vec();
        let cipher = Aes256CbcDec::new(key.into(), &iv.into());
        let len = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| CryptoError::DecryptionFailed)?
            .len();

        buffer.truncate(len);
        Ok(buffer)
    }

    /// pinUvAuthParam: the full 32-byte HMAC-SHA-256
    pub fn authenticate(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
        hmac_sha256(key, data)
    }

    /// Constant-time MAC check
    pub fn verify(key: &[u8; 32], data: &[u8], expected: &[u8; 32]) -> bool {
        let computed = authenticate(key, data);
        computed.ct_eq(expected).into()
    }
}
