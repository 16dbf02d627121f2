//! Vendor-Specific attributes (RFC 2865 Section 5.26)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Length       |            Vendor-Id
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!      Vendor-Id (cont)           | Vendor type   | Vendor length |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Attribute-Specific...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only the single-sub-attribute layout used by Microsoft (RFC 2548) is
//! understood; other vendors' formats are left to the caller.

use super::{Attribute, AttributeType};
use crate::packet::PacketError;

/// IANA private enterprise number for Microsoft
pub const MICROSOFT_VENDOR_ID: u32 = 311;

/// Microsoft vendor sub-types carrying MS-CHAP material (RFC 2548 Section 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MicrosoftAttributeType {
    /// MS-CHAP-Error (2)
    ChapError = 2,
    /// MS-CHAP-Challenge (11)
    ChapChallenge = 11,
    /// MS-CHAP2-Response (25)
    Chap2Response = 25,
    /// MS-CHAP2-Success (26)
    Chap2Success = 26,
}

impl MicrosoftAttributeType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A decoded Vendor-Specific attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSpecific {
    pub vendor_id: u32,
    pub vendor_type: u8,
    pub value: Vec<u8>,
}

impl VendorSpecific {
    /// Vendor-Id + vendor type + vendor length
    const HEADER_SIZE: usize = 6;

    pub fn new(vendor_id: u32, vendor_type: u8, value: Vec<u8>) -> Self {
        VendorSpecific {
            vendor_id,
            vendor_type,
            value,
        }
    }

    /// Microsoft sub-attribute
    pub fn microsoft(vendor_type: MicrosoftAttributeType, value: Vec<u8>) -> Self {
        Self::new(MICROSOFT_VENDOR_ID, vendor_type.as_u8(), value)
    }

    pub fn from_attribute(attr: &Attribute) -> Result<Self, PacketError> {
        if attr.attr_type != AttributeType::VendorSpecific as u8 {
            return Err(PacketError::AttributeError(format!(
                "Attribute {} is not Vendor-Specific",
                attr.attr_type
            )));
        }

        let data = attr.value.as_slice();
        if data.len() < Self::HEADER_SIZE {
            return Err(PacketError::AttributeError(format!(
                "Vendor-Specific too short: {} bytes",
                data.len()
            )));
        }

        let vendor_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let vendor_type = data[4];
        let vendor_length = data[5] as usize;
        if vendor_length < 2 || vendor_length != data.len() - 4 {
            return Err(PacketError::AttributeError(format!(
                "Vendor-Specific sub-attribute length {} does not match {} bytes of data",
                vendor_length,
                data.len() - 4
            )));
        }

        Ok(VendorSpecific {
            vendor_id,
            vendor_type,
            value: data[Self::HEADER_SIZE..].to_vec(),
        })
    }

    pub fn to_attribute(&self) -> Result<Attribute, PacketError> {
        let vendor_length = self.value.len() + 2;
        if vendor_length > u8::MAX as usize {
            return Err(PacketError::AttributeError(format!(
                "Vendor sub-attribute too long: {} bytes",
                self.value.len()
            )));
        }

        let mut value = Vec::with_capacity(Self::HEADER_SIZE + self.value.len());
        value.extend_from_slice(&self.vendor_id.to_be_bytes());
        value.push(self.vendor_type);
        value.push(vendor_length as u8);
        value.extend_from_slice(&self.value);
        Attribute::new(AttributeType::VendorSpecific as u8, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_attribute_layout() {
        let vsa = VendorSpecific::microsoft(MicrosoftAttributeType::ChapChallenge, vec![0xAB; 16]);
        let attr = vsa.to_attribute().unwrap();

        assert_eq!(attr.attr_type, 26);
        assert_eq!(&attr.value[..4], &[0, 0, 0x01, 0x37]);
        assert_eq!(attr.value[4], 11);
        assert_eq!(attr.value[5], 18);
        assert_eq!(VendorSpecific::from_attribute(&attr).unwrap(), vsa);
    }

    #[test]
    fn test_rejects_inconsistent_sub_length() {
        let attr = Attribute::new(26, vec![0, 0, 1, 0x37, 25, 9, 1, 2, 3]).unwrap();
        assert!(VendorSpecific::from_attribute(&attr).is_err());
    }

    #[test]
    fn test_rejects_other_attribute_types() {
        let attr = Attribute::string(1, "alice").unwrap();
        assert!(VendorSpecific::from_attribute(&attr).is_err());
    }
}
