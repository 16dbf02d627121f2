//! RADIUS attributes

mod attribute;
mod types;
pub mod vendor;

pub use attribute::Attribute;
pub use types::AttributeType;
pub use vendor::{MICROSOFT_VENDOR_ID, MicrosoftAttributeType, VendorSpecific};
