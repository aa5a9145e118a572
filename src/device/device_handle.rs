// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use crate::error::Result;
use crate::error::RtlsdrError::RtlsdrErr;
use crate::DeviceId;
use log::info;
use rusb::{Context, UsbContext};

use super::{CTRL_TIMEOUT, KNOWN_DEVICES};

#[derive(Debug)]
pub struct DeviceHandle {
    handle: rusb::DeviceHandle<Context>,
}

impl DeviceHandle {
    pub fn open(id: DeviceId) -> Result<Self> {
        let mut context = Context::new()?;
        let handle = match id {
            DeviceId::Index(index) => DeviceHandle::open_device(&mut context, index)?,
            DeviceId::Fd(fd) => DeviceHandle::open_device_with_fd(&mut context, fd)?,
        };
        Ok(DeviceHandle { handle })
    }

    pub fn open_device<T: UsbContext>(
        context: &mut T,
        index: usize,
    ) -> Result<rusb::DeviceHandle<T>> {
        let devices = context.devices().map_err(|e| {
            info!("Failed to get devices: {:?}", e);
            RtlsdrErr(format!("Error: {:?}", e))
        })?;

        let mut device_count = 0;

        for (i, found) in devices.iter().enumerate() {
            let device_desc = match found.device_descriptor() {
                Ok(desc) => desc,
                Err(e) => {
                    info!("Failed to get device descriptor for device {}: {:?}", i, e);
                    continue;
                }
            };

            for dev in KNOWN_DEVICES.iter() {
                if device_desc.vendor_id() == dev.vid && device_desc.product_id() == dev.pid {
                    if device_count == index {
                        info!("Opening device at index {}", index);
                        return found.open().map_err(|e| {
                            info!("Failed to open device: {:?}", e);
                            RtlsdrErr(format!("Error: {:?}", e))
                        });
                    }
                    device_count += 1;
                }
            }
        }

        info!(
            "No matching device found at the requested index {}. Total matched devices: {}",
            index, device_count
        );

        Err(RtlsdrErr(format!("No device found at index {}", index)))
    }

    #[cfg(unix)]
    pub fn open_device_with_fd<T: UsbContext>(
        context: &mut T,
        fd: i32,
    ) -> Result<rusb::DeviceHandle<T>> {
        use std::os::unix::io::RawFd;

        info!("Opening device with file descriptor {}", fd);

        unsafe {
            context.open_device_with_fd(fd as RawFd).map_err(|e| {
                info!("Failed to open device with fd {}: {:?}", fd, e);
                RtlsdrErr(format!("Error opening device with fd {}: {:?}", fd, e))
            })
        }
    }

    #[cfg(not(unix))]
    pub fn open_device_with_fd<T: UsbContext>(
        _context: &mut T,
        _fd: i32,
    ) -> Result<rusb::DeviceHandle<T>> {
        Err(RtlsdrErr(
            "File descriptor opening is only supported on Unix systems".to_string(),
        ))
    }

    pub fn claim_interface(&mut self, iface: u8) -> Result<()> {
        Ok(self.handle.claim_interface(iface)?)
    }

    pub fn reset(&mut self) -> Result<()> {
        Ok(self.handle.reset()?)
    }

    pub fn release_interface(&mut self, iface: u8) -> Result<()> {
        Ok(self.handle.release_interface(iface)?)
    }

    pub fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        Ok(self
            .handle
            .read_control(request_type, request, value, index, buf, timeout)?)
    }

    pub fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        Ok(self
            .handle
            .write_control(request_type, request, value, index, buf, timeout)?)
    }

    pub fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        Ok(self.handle.read_bulk(endpoint, buf, timeout)?)
    }

    /// Manufacturer/product/serial strings, used only for `device_list`-style diagnostics.
    pub fn get_usb_strings(&self) -> Result<(Option<String>, Option<String>, Option<String>)> {
        let device = self.handle.device();
        let desc = device.device_descriptor()?;
        let languages = self.handle.read_languages(CTRL_TIMEOUT)?;
        let lang = match languages.first() {
            Some(l) => *l,
            None => return Ok((None, None, None)),
        };
        let manufacturer = self
            .handle
            .read_manufacturer_string(lang, &desc, CTRL_TIMEOUT)
            .ok();
        let product = self
            .handle
            .read_product_string(lang, &desc, CTRL_TIMEOUT)
            .ok();
        let serial = self
            .handle
            .read_serial_number_string(lang, &desc, CTRL_TIMEOUT)
            .ok();
        Ok((manufacturer, product, serial))
    }
}

/// One entry of a [`DeviceDescriptors`] listing: a known-vendor/product dongle
/// found on the bus, at its positional enumeration index among matches, with
/// the USB string descriptors CLIs use to let an operator pick among several.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// Lists every attached dongle matching [`KNOWN_DEVICES`], in enumeration
/// order. Opens each match briefly to read its string descriptors; a
/// descriptor that can't be read (permissions, a device that vanished
/// mid-scan) is rendered as an empty string rather than aborting the scan.
pub struct DeviceDescriptors {
    descriptors: Vec<DeviceDescriptor>,
}

impl DeviceDescriptors {
    pub fn new() -> Result<Self> {
        let context = Context::new()?;
        let devices = context
            .devices()
            .map_err(|e| RtlsdrErr(format!("Error: {:?}", e)))?;

        let mut descriptors = Vec::new();
        let mut index = 0;
        for found in devices.iter() {
            let device_desc = match found.device_descriptor() {
                Ok(desc) => desc,
                Err(_) => continue,
            };
            let known = KNOWN_DEVICES
                .iter()
                .any(|d| d.vid == device_desc.vendor_id() && d.pid == device_desc.product_id());
            if !known {
                continue;
            }

            let (manufacturer, product, serial) = match found.open() {
                Ok(handle) => {
                    let languages = handle.read_languages(CTRL_TIMEOUT).unwrap_or_default();
                    match languages.first() {
                        Some(lang) => (
                            handle
                                .read_manufacturer_string(*lang, &device_desc, CTRL_TIMEOUT)
                                .unwrap_or_default(),
                            handle
                                .read_product_string(*lang, &device_desc, CTRL_TIMEOUT)
                                .unwrap_or_default(),
                            handle
                                .read_serial_number_string(*lang, &device_desc, CTRL_TIMEOUT)
                                .unwrap_or_default(),
                        ),
                        None => (String::new(), String::new(), String::new()),
                    }
                }
                Err(_) => (String::new(), String::new(), String::new()),
            };

            descriptors.push(DeviceDescriptor {
                index,
                manufacturer,
                product,
                serial,
            });
            index += 1;
        }

        Ok(DeviceDescriptors { descriptors })
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
