//! CTAPHID transport layer
//!
//! This crate provides the framing half of talking to a FIDO2
//! authenticator over HID:
//! - CTAPHID message framing (fragmentation, reassembly, sequence checks)
//! - The [`HidDevice`] trait, the seam between protocol logic and raw
//!   report I/O
//! - USB HID device access via hidapi - requires "usb" feature
//!
//! # Features
//!
//! - `usb`: Enable USB HID device access (requires libudev on Linux)
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb>

pub mod ctaphid;
pub mod error;
pub mod hid;

pub use ctaphid::{
    BROADCAST_CID, Cmd, DEFAULT_REPORT_SIZE, MAX_MESSAGE_SIZE, MIN_REPORT_SIZE, Message, Packet,
};
pub use error::{Error, ErrorCode, Result};
pub use hid::HidDevice;
#[cfg(feature = "usb")]
pub use hid::{UsbDeviceInfo, UsbHidDevice, enumerate_devices, init_usb};
