//! Client-side FIDO2/CTAP2 protocol engine
//!
//! Talks to a FIDO2 authenticator over CTAPHID: opens a channel, negotiates
//! PIN/UV auth, manages discoverable credentials and requests assertions.
//!
//! ```rust,ignore
//! use fido2_client::{Device, pin::{PinUvAuthSession, PinUvAuthProtocol, permissions}};
//!
//! let api = fido2_client::transport::init_usb()?;
//! let hid = fido2_client::transport::UsbHidDevice::open_first(&api)?;
//! let mut device = Device::open(hid)?;
//!
//! let protocol = PinUvAuthProtocol::select(device.info()).unwrap_or(PinUvAuthProtocol::V1);
//! let session = PinUvAuthSession::establish(&mut device, protocol)?;
//! let token = session.get_pin_token_with_permissions(
//!     &mut device,
//!     "1234",
//!     permissions::CREDENTIAL_MANAGEMENT,
//!     None,
//! )?;
//!
//! for rp in fido2_client::credman::enumerate_rps(&mut device, &token)? {
//!     println!("{}", rp.rp.id);
//! }
//! ```
//!
//! The transport is injectable: anything implementing
//! [`transport::HidDevice`] can back a [`Device`], which is how the test
//! suite drives the whole stack against canned wire data.

pub mod assertion;
pub mod credman;
pub mod device;
pub mod error;
pub mod info;
pub mod pin;
pub mod request;
pub mod response;

pub use assertion::{Assertion, get_assertion};
pub use device::Device;
pub use error::{Error, Result};
pub use info::DeviceInfo;
pub use request::{ClientDataHash, GetAssertionRequest};
pub use response::{CredentialsMetadata, RelyingPartyInfo, ResidentCredential};

pub use fido2_client_ctap as ctap;
pub use fido2_client_transport as transport;

pub use fido2_client_ctap::types::{PublicKeyCredentialDescriptor, RelyingParty, User};
pub use fido2_client_ctap::{CtapCommand, StatusCode};
