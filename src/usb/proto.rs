//! USB protocol constants and static descriptors.
//!
//! The identity is fixed: LEGO's vendor ID with the 0xFF00 product,
//! class 2, one vendor-specific interface with one bulk pipe in each
//! direction. Hosts recognize the brick by exactly these bytes, so they
//! are spelled out as tables rather than built from abstractions.

use static_assertions as sa;

pub const VENDOR_ID: u16 = 0x0694;
pub const PRODUCT_ID: u16 = 0xFF00;

/// Control endpoint max packet size.
pub const EP0_MAX_PACKET: usize = 8;
/// Bulk endpoint max packet size (EP1 IN, EP2 OUT).
pub const BULK_MAX_PACKET: usize = 64;

pub const DEVICE_DESCRIPTOR: [u8; 18] = [
    18,   // bLength
    0x01, // bDescriptorType: device
    0x00, 0x02, // bcdUSB 2.0
    0x02, // bDeviceClass
    0x00, // bDeviceSubClass
    0x00, // bDeviceProtocol
    EP0_MAX_PACKET as u8,
    0x94, 0x06, // idVendor
    0x00, 0xFF, // idProduct
    0x00, 0x00, // bcdDevice
    1,    // iManufacturer
    2,    // iProduct
    0,    // iSerialNumber
    1,    // bNumConfigurations
];

/// Configuration, interface and both endpoint descriptors in one
/// transfer unit, as GET_DESCRIPTOR(CONFIGURATION) returns them.
pub const CONFIG_DESCRIPTOR: [u8; 32] = [
    // configuration
    9,    // bLength
    0x02, // bDescriptorType: configuration
    32, 0, // wTotalLength
    1,    // bNumInterfaces
    1,    // bConfigurationValue
    0,    // iConfiguration
    0xC0, // bmAttributes: reserved | self-powered
    0,    // bMaxPower (0 * 2 mA)
    // interface
    9,    // bLength
    0x04, // bDescriptorType: interface
    0,    // bInterfaceNumber
    0,    // bAlternateSetting
    2,    // bNumEndpoints
    0xFF, 0xFF, 0xFF, // vendor-specific class/subclass/protocol
    0,    // iInterface
    // endpoint 1: bulk IN
    7,    // bLength
    0x05, // bDescriptorType: endpoint
    0x81, // bEndpointAddress: IN 1
    0x02, // bmAttributes: bulk
    BULK_MAX_PACKET as u8, 0, // wMaxPacketSize
    0,    // bInterval
    // endpoint 2: bulk OUT
    7, 0x05, 0x02, 0x02, BULK_MAX_PACKET as u8, 0, 0,
];

sa::const_assert_eq!(CONFIG_DESCRIPTOR[2] as usize, CONFIG_DESCRIPTOR.len());

/// String descriptor 0: we speak English (0x0809).
pub const LANG_DESCRIPTOR: [u8; 4] = [4, 0x03, 0x09, 0x08];

const fn string_descriptor<const N: usize>(ascii: &[u8]) -> [u8; N] {
    assert!(N == 2 + 2 * ascii.len());
    let mut out = [0u8; N];
    out[0] = N as u8;
    out[1] = 0x03;
    let mut i = 0;
    while i < ascii.len() {
        // ASCII maps straight into UTF-16LE code units.
        out[2 + 2 * i] = ascii[i];
        i += 1;
    }
    out
}

pub const MANUFACTURER_STRING: [u8; 10] = string_descriptor(b"LEGO");
pub const PRODUCT_STRING: [u8; 8] = string_descriptor(b"NXT");

/// Descriptor types in the high byte of GET_DESCRIPTOR's wValue.
pub mod descriptor_type {
    pub const DEVICE: u8 = 1;
    pub const CONFIGURATION: u8 = 2;
    pub const STRING: u8 = 3;
}

/// Standard request codes.
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const SET_INTERFACE: u8 = 0x0B;
}

/// The 8-byte control-transfer request header.
#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, defmt::Format)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

impl SetupPacket {
    pub fn parse(raw: &[u8; 8]) -> Self {
        Self {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Data phase runs device-to-host.
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0x0f {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            _ => Recipient::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_descriptor_prefix_matches_the_wire_contract() {
        // What a host sees for GET_DESCRIPTOR(DEVICE, 8).
        assert_eq!(
            &DEVICE_DESCRIPTOR[..8],
            &[0x12, 0x01, 0x00, 0x02, 0x02, 0x00, 0x00, 0x08]
        );
        assert_eq!(
            u16::from_le_bytes([DEVICE_DESCRIPTOR[8], DEVICE_DESCRIPTOR[9]]),
            VENDOR_ID
        );
        assert_eq!(
            u16::from_le_bytes([DEVICE_DESCRIPTOR[10], DEVICE_DESCRIPTOR[11]]),
            PRODUCT_ID
        );
    }

    #[test]
    fn string_descriptors_are_utf16le() {
        assert_eq!(MANUFACTURER_STRING, [10, 3, b'L', 0, b'E', 0, b'G', 0, b'O', 0]);
        assert_eq!(PRODUCT_STRING, [8, 3, b'N', 0, b'X', 0, b'T', 0]);
    }

    #[test]
    fn setup_parse_is_little_endian() {
        let setup = SetupPacket::parse(&[0x80, 0x06, 0x00, 0x01, 0x09, 0x08, 0x12, 0x00]);
        assert!(setup.is_in());
        assert_eq!(setup.recipient(), Recipient::Device);
        assert_eq!(setup.request, request::GET_DESCRIPTOR);
        assert_eq!(setup.value, 0x0100);
        assert_eq!(setup.index, 0x0809);
        assert_eq!(setup.length, 0x0012);
    }
}
