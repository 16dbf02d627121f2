//! Packet codec used by the relay in active mode

use radius_proto::{Packet, PacketError};

/// Converts between wire bytes and a structured packet.
///
/// `decode` must leave its input alone and `encode` must be deterministic:
/// an untouched packet re-encodes to the bytes it was decoded from.
pub trait PacketCodec: Send + Sync {
    type Packet: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(&self, raw: &[u8]) -> Result<Self::Packet, Self::Error>;

    fn encode(&self, packet: &Self::Packet) -> Result<Vec<u8>, Self::Error>;
}

/// RFC 2865 framing via [`radius_proto::Packet`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RadiusCodec;

impl PacketCodec for RadiusCodec {
    type Packet = Packet;
    type Error = PacketError;

    fn decode(&self, raw: &[u8]) -> Result<Packet, PacketError> {
        Packet::decode(raw)
    }

    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, PacketError> {
        packet.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radius_proto::{Attribute, AttributeType, Code};

    fn access_request() -> Vec<u8> {
        let mut packet = Packet::new(Code::AccessRequest, 7, [0xA5; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
        packet.add_attribute(Attribute::integer(AttributeType::NasPort.as_u8(), 3).unwrap());
        packet.encode().unwrap()
    }

    #[test]
    fn test_untouched_packet_reencodes_identically() {
        let codec = RadiusCodec;
        let raw = access_request();
        let packet = codec.decode(&raw).unwrap();
        assert_eq!(codec.encode(&packet).unwrap(), raw);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = RadiusCodec;
        assert!(codec.decode(b"not radius").is_err());
        assert!(matches!(
            codec.decode(&[0u8; 20]),
            Err(PacketError::InvalidCode(0))
        ));
    }

    #[test]
    fn test_mutation_changes_encoding() {
        let codec = RadiusCodec;
        let raw = access_request();
        let mut packet = codec.decode(&raw).unwrap();
        packet.identifier = 8;
        let encoded = codec.encode(&packet).unwrap();
        assert_eq!(encoded[1], 8);
        assert_eq!(encoded[2..], raw[2..]);
    }
}
