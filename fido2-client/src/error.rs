//! Client error types
//!
//! One taxonomy for the whole stack. Transport failures carry the CTAPHID
//! error, protocol failures carry the authenticator status byte. Statuses
//! that mean "your PIN/UV token is no good" get their own variant so callers
//! can re-prompt for the PIN instead of giving up.

use fido2_client_crypto::CryptoError;
use fido2_client_ctap::{CborError, StatusCode};

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// CTAPHID framing or HID I/O failure
    Transport(fido2_client_transport::Error),
    /// Malformed or non-canonical CBOR in a response
    Parse(CborError),
    /// Authenticator returned a non-success status
    Device(StatusCode),
    /// Authenticator rejected the PIN/UV token or parameter
    Auth(StatusCode),
    /// A request is already in flight on this session
    Concurrency,
    /// The session hit a transport failure and must be reopened
    SessionFailed,
    /// Channel allocation handshake failed
    Init(String),
    /// Caller supplied an invalid argument
    InvalidParameter(&'static str),
}

impl Error {
    /// Map an authenticator status byte to the right variant
    ///
    /// Success never reaches here; callers check `is_success` first.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_auth_failure() {
            Error::Auth(status)
        } else {
            Error::Device(status)
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(err) => write!(f, "transport error: {err}"),
            Error::Parse(err) => write!(f, "response parse error: {err}"),
            Error::Device(status) => write!(f, "authenticator error: {status}"),
            Error::Auth(status) => write!(f, "authentication failure: {status}"),
            Error::Concurrency => write!(f, "a request is already in flight"),
            Error::SessionFailed => write!(f, "session is in a failed state, reopen the device"),
            Error::Init(msg) => write!(f, "channel initialization failed: {msg}"),
            Error::InvalidParameter(what) => write!(f, "invalid parameter: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            Error::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<fido2_client_transport::Error> for Error {
    fn from(err: fido2_client_transport::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<CborError> for Error {
    fn from(err: CborError) -> Self {
        Error::Parse(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPublicKey | CryptoError::InvalidCoseKey => {
                Error::Parse(CborError::Decode)
            }
            CryptoError::InvalidSignature => Error::InvalidParameter("signature verification failed"),
            CryptoError::DecryptionFailed => Error::InvalidParameter("decryption failed"),
            CryptoError::EncryptionFailed => Error::InvalidParameter("encryption failed"),
            CryptoError::InvalidPrivateKey => Error::InvalidParameter("invalid private key"),
            CryptoError::InvalidKeyLength { .. } => Error::InvalidParameter("invalid key length"),
        }
    }
}
