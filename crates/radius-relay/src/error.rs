//! Relay error types

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that end a relay run.
///
/// Per-datagram problems (codec failures, interceptor drops, unmatched
/// downstream traffic) never surface here; they are logged and counted.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A listening or per-peer socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A per-peer socket could not be connected to the server
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Reading from an established socket failed
    #[error("Transport failure on local port {local_port}: {source}")]
    Transport {
        local_port: u16,
        #[source]
        source: std::io::Error,
    },

    /// No free port left at or above the peer's source port
    #[error("No local port available at or above {start}")]
    PortsExhausted { start: u16 },

    /// The session has no ports to listen on
    #[error("Session has no target ports")]
    NoPorts,

    /// The event channel closed under the central loop. The loop holds a
    /// sender of its own for new endpoints, so during `run` this only fires
    /// if that sender and every receive task are gone.
    #[error("Relay event channel closed")]
    ChannelClosed,
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
