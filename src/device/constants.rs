#![allow(dead_code)]

use std::time::Duration;

pub struct UsbDeviceSignature {
    pub vid: u16,
    pub pid: u16,
    pub description: &'static str,
}
/// Deliberately the small list from §6: this receiver targets the RTL2832U
/// demodulator paired with an R820T tuner, not the dozens of third-party
/// rebrands the chip has shipped under (a non-goal — "device discovery
/// beyond a small USB vendor/product list").
pub const KNOWN_DEVICES: &'static [UsbDeviceSignature; 2] = &[
    UsbDeviceSignature {
        vid: 0x0bda,
        pid: 0x2832,
        description: "Generic RTL2832U",
    },
    UsbDeviceSignature {
        vid: 0x0bda,
        pid: 0x2838,
        description: "Generic RTL2832U OEM",
    },
];

pub const EEPROM_ADDR: u16 = 0xa0;
pub const EEPROM_SIZE: usize = 256;

// Blocks
pub const BLOCK_DEMOD: u16 = 0;
pub const BLOCK_USB: u16 = 1;
pub const BLOCK_SYS: u16 = 2;
pub const BLOCK_TUN: u16 = 3;
pub const BLOCK_ROM: u16 = 4;
pub const BLOCK_IRB: u16 = 5;
pub const BLOCK_IIC: u16 = 6;

// Sys Registers
pub const DEMOD_CTL: u16 = 0x3000;
pub const GPO: u16 = 0x3001;
pub const GPI: u16 = 0x3002;
pub const GPOE: u16 = 0x3003;
pub const GPD: u16 = 0x3004;
pub const SYSINTE: u16 = 0x3005;
pub const SYSINTS: u16 = 0x3006;
pub const GP_CFG0: u16 = 0x3007;
pub const GP_CFG1: u16 = 0x3008;
pub const SYSINTE_1: u16 = 0x3009;
pub const SYSINTS_1: u16 = 0x300a;
pub const DEMOD_CTL_1: u16 = 0x300b;
pub const IR_SUSPEND: u16 = 0x300c;

// USB Registers
pub const USB_SYSCTL: u16 = 0x2000;
pub const USB_CTRL: u16 = 0x2010;
pub const USB_STAT: u16 = 0x2014;
pub const USB_EPA_CFG: u16 = 0x2144;
pub const USB_EPA_CTL: u16 = 0x2148;
pub const USB_EPA_MAXPKT: u16 = 0x2158;
pub const USB_EPA_MAXPKT_2: u16 = 0x215a;
pub const USB_EPA_FIFO_CFG: u16 = 0x2160;

pub const CTRL_IN: u8 =
    rusb::constants::LIBUSB_ENDPOINT_IN | rusb::constants::LIBUSB_REQUEST_TYPE_VENDOR;
pub const CTRL_OUT: u8 =
    rusb::constants::LIBUSB_ENDPOINT_OUT | rusb::constants::LIBUSB_REQUEST_TYPE_VENDOR;
pub const CTRL_TIMEOUT: Duration = Duration::from_millis(300);
pub const BULK_TIMEOUT: Duration = Duration::from_secs(2);
