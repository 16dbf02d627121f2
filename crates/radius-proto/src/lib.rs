//! RADIUS Protocol Support for the Relay
//!
//! This crate provides the pieces of RADIUS a man-in-the-middle relay needs:
//!
//! - Packet framing (RFC 2865 Section 3) that round-trips the wire bytes
//! - Attributes as opaque TLVs, plus Vendor-Specific decoding for the
//!   Microsoft MS-CHAP sub-attributes (RFC 2548)
//! - MS-CHAPv2 response and authenticator computation (RFC 2759)
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::mschapv2::generate_nt_response;
//!
//! let mut packet = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
//! packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "User").unwrap());
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap(), packet);
//!
//! let response = generate_nt_response(&[0x5B; 16], &[0x21; 16], "User", "clientPass").unwrap();
//! assert_eq!(response.len(), 24);
//! ```

pub mod attributes;
pub mod mschapv2;
pub mod packet;

pub use attributes::{
    Attribute, AttributeType, MICROSOFT_VENDOR_ID, MicrosoftAttributeType, VendorSpecific,
};
pub use mschapv2::{MsChap2Response, MsChap2Success, MsChapV2Error};
pub use packet::{Code, Packet, PacketError};
