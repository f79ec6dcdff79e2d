//! HID device abstraction
//!
//! Framing and session logic talk to the authenticator through the
//! [`HidDevice`] trait so that any report pipe works: a real USB handle,
//! a virtual device, or a scripted test double.

use std::time::Duration;

use crate::error::Result;

#[cfg(feature = "usb")]
use crate::error::Error;

#[cfg(feature = "usb")]
use std::ffi::CString;

#[cfg(feature = "usb")]
use hidapi::HidApi;

/// FIDO HID usage page
#[cfg(feature = "usb")]
const FIDO_USAGE_PAGE: u16 = 0xF1D0;

/// FIDO HID usage
#[cfg(feature = "usb")]
const FIDO_USAGE: u16 = 0x01;

/// A raw HID report pipe to an authenticator
///
/// Implementations exchange fixed-size reports. All reports on one device
/// are exactly `report_size()` bytes long.
pub trait HidDevice {
    /// Write one report to the device
    fn write_report(&mut self, report: &[u8]) -> Result<()>;

    /// Read one report, waiting up to `timeout`
    ///
    /// Returns `Err(Error::Timeout)` if no report arrives in time.
    fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Report size in bytes for this device
    fn report_size(&self) -> usize;
}

/// USB HID device information from enumeration
#[cfg(feature = "usb")]
#[derive(Debug, Clone)]
pub struct UsbDeviceInfo {
    /// Vendor ID
    pub vendor_id: u16,

    /// Product ID
    pub product_id: u16,

    /// Device path (platform-specific)
    pub path: String,

    /// Manufacturer string
    pub manufacturer: Option<String>,

    /// Product string
    pub product: Option<String>,

    /// Serial number
    pub serial_number: Option<String>,
}

/// USB HID authenticator handle backed by hidapi
#[cfg(feature = "usb")]
pub struct UsbHidDevice {
    device: hidapi::HidDevice,
    info: UsbDeviceInfo,
    report_size: usize,
}

#[cfg(feature = "usb")]
impl UsbHidDevice {
    /// Open a USB HID device by path
    pub fn open(api: &HidApi, path: &str) -> Result<Self> {
        let c_path =
            CString::new(path).map_err(|e| Error::Io(format!("Invalid device path: {}", e)))?;

        let device = api
            .open_path(&c_path)
            .map_err(|e| Error::Io(format!("Failed to open device: {}", e)))?;

        let info = UsbDeviceInfo {
            vendor_id: 0,
            product_id: 0,
            path: path.to_string(),
            manufacturer: None,
            product: None,
            serial_number: None,
        };

        Ok(Self {
            device,
            info,
            report_size: crate::ctaphid::DEFAULT_REPORT_SIZE,
        })
    }

    /// Open the first enumerated FIDO authenticator
    pub fn open_first(api: &HidApi) -> Result<Self> {
        let devices = enumerate_devices(api)?;
        let first = devices.first().ok_or(Error::DeviceNotFound)?;
        let mut opened = Self::open(api, &first.path)?;
        opened.info = first.clone();
        Ok(opened)
    }

    /// Device information
    pub fn device_info(&self) -> &UsbDeviceInfo {
        &self.info
    }
}

#[cfg(feature = "usb")]
impl HidDevice for UsbHidDevice {
    fn write_report(&mut self, report: &[u8]) -> Result<()> {
        // hidapi expects a leading report id byte; FIDO devices use id 0
        let mut buf = Vec::with_capacity(report.len() + 1);
        buf.push(0);
        buf.extend_from_slice(report);

        let written = self
            .device
            .write(&buf)
            .map_err(|e| Error::Io(format!("Failed to write report: {}", e)))?;

        if written != buf.len() {
            return Err(Error::Io(format!(
                "Incomplete write: {} of {} bytes",
                written,
                buf.len()
            )));
        }

        Ok(())
    }

    fn read_report(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.report_size];
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let read = self
            .device
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| Error::Io(format!("Failed to read report: {}", e)))?;

        if read == 0 {
            return Err(Error::Timeout);
        }

        if read != self.report_size {
            return Err(Error::Io(format!(
                "Incomplete read: {} bytes (expected {})",
                read, self.report_size
            )));
        }

        Ok(buf)
    }

    fn report_size(&self) -> usize {
        self.report_size
    }
}

/// Enumerate connected FIDO authenticators
///
/// Filters the HID device list by the FIDO usage page.
#[cfg(feature = "usb")]
pub fn enumerate_devices(api: &HidApi) -> Result<Vec<UsbDeviceInfo>> {
    let mut devices = Vec::new();

    for device_info in api.device_list() {
        if device_info.usage_page() == FIDO_USAGE_PAGE && device_info.usage() == FIDO_USAGE {
            devices.push(UsbDeviceInfo {
                vendor_id: device_info.vendor_id(),
                product_id: device_info.product_id(),
                path: device_info.path().to_string_lossy().to_string(),
                manufacturer: device_info.manufacturer_string().map(|s| s.to_string()),
                product: device_info.product_string().map(|s| s.to_string()),
                serial_number: device_info.serial_number().map(|s| s.to_string()),
            });
        }
    }

    Ok(devices)
}

/// Initialize the HID API
#[cfg(feature = "usb")]
pub fn init_usb() -> Result<HidApi> {
    HidApi::new().map_err(|e| Error::Io(format!("Failed to initialize HID API: {}", e)))
}
