/// Attribute numbers the relay and its interceptors look at.
///
/// Deliberately partial: everything else is carried as an opaque TLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865
    UserPassword = 2,
    /// CHAP-Password (3) - RFC 2865
    ChapPassword = 3,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// NAS-Port (5) - RFC 2865
    NasPort = 5,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// State (24) - RFC 2865
    State = 24,
    /// Class (25) - RFC 2865
    Class = 25,
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26,
    /// Called-Station-Id (30) - RFC 2865
    CalledStationId = 30,
    /// Calling-Station-Id (31) - RFC 2865
    CallingStationId = 31,
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32,
    /// Proxy-State (33) - RFC 2865
    ProxyState = 33,
    /// CHAP-Challenge (60) - RFC 2865
    ChapChallenge = 60,
    /// EAP-Message (79) - RFC 3579
    EapMessage = 79,
    /// Message-Authenticator (80) - RFC 2869
    MessageAuthenticator = 80,
}

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        let attr = match value {
            1 => AttributeType::UserName,
            2 => AttributeType::UserPassword,
            3 => AttributeType::ChapPassword,
            4 => AttributeType::NasIpAddress,
            5 => AttributeType::NasPort,
            18 => AttributeType::ReplyMessage,
            24 => AttributeType::State,
            25 => AttributeType::Class,
            26 => AttributeType::VendorSpecific,
            30 => AttributeType::CalledStationId,
            31 => AttributeType::CallingStationId,
            32 => AttributeType::NasIdentifier,
            33 => AttributeType::ProxyState,
            60 => AttributeType::ChapChallenge,
            79 => AttributeType::EapMessage,
            80 => AttributeType::MessageAuthenticator,
            _ => return None,
        };
        Some(attr)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
