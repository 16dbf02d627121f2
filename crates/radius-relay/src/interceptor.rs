//! Per-packet policy for active mode
//!
//! The interceptor sees every decoded packet before it is forwarded. It may
//! rewrite the packet in place and decides whether it goes out at all.

use radius_proto::attributes::AttributeType;
use radius_proto::{MICROSOFT_VENDOR_ID, MicrosoftAttributeType, MsChap2Response, Packet};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use tracing::{debug, info};

/// Decides the fate of a decoded packet.
///
/// Returning `true` forwards the (possibly modified) packet, `false` drops
/// it. `from` and `to` are the addresses the packet travels between.
pub trait PacketInterceptor<P>: Send {
    fn decide(&mut self, packet: &mut P, from: SocketAddr, to: SocketAddr) -> bool;
}

impl<P, F> PacketInterceptor<P> for F
where
    F: FnMut(&mut P, SocketAddr, SocketAddr) -> bool + Send,
{
    fn decide(&mut self, packet: &mut P, from: SocketAddr, to: SocketAddr) -> bool {
        self(packet, from, to)
    }
}

/// Logs what crosses the relay and drops packets with configured codes
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    drop_codes: BTreeSet<u8>,
    seen: u64,
    dropped: u64,
}

impl LoggingInterceptor {
    pub fn new(drop_codes: impl IntoIterator<Item = u8>) -> Self {
        LoggingInterceptor {
            drop_codes: drop_codes.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Packets inspected so far
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Packets refused because of their code
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn log_mschapv2(packet: &Packet) {
        let Some(vsa) = packet.find_vendor_attribute(
            MICROSOFT_VENDOR_ID,
            MicrosoftAttributeType::Chap2Response.as_u8(),
        ) else {
            return;
        };

        match MsChap2Response::from_bytes(&vsa.value) {
            Ok(response) => {
                let challenge = packet
                    .find_vendor_attribute(
                        MICROSOFT_VENDOR_ID,
                        MicrosoftAttributeType::ChapChallenge.as_u8(),
                    )
                    .map(|c| hex::encode(c.value))
                    .unwrap_or_default();
                info!(
                    ident = response.ident,
                    auth_challenge = %challenge,
                    peer_challenge = %hex::encode(response.peer_challenge),
                    nt_response = %hex::encode(response.nt_response),
                    "MS-CHAPv2 response"
                );
            }
            Err(e) => debug!(error = %e, "Malformed MS-CHAP2-Response"),
        }
    }
}

impl PacketInterceptor<Packet> for LoggingInterceptor {
    fn decide(&mut self, packet: &mut Packet, from: SocketAddr, to: SocketAddr) -> bool {
        self.seen += 1;

        let username = packet
            .find_attribute(AttributeType::UserName.as_u8())
            .and_then(|attr| attr.as_string().ok());

        info!(
            code = ?packet.code,
            identifier = packet.identifier,
            username = username.as_deref().unwrap_or("-"),
            %from,
            %to,
            "Intercepted packet"
        );
        Self::log_mschapv2(packet);

        if self.drop_codes.contains(&packet.code.as_u8()) {
            self.dropped += 1;
            info!(code = ?packet.code, identifier = packet.identifier, "Dropping by policy");
            return false;
        }
        true
    }
}
