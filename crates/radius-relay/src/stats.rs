//! Relay statistics

use serde::{Deserialize, Serialize};

/// Counters kept by the relay's central loop for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStats {
    /// Datagrams taken off the event channel
    pub datagrams_received: u64,
    /// Datagrams travelling towards the authenticator server
    pub upstream: u64,
    /// Datagrams travelling towards an authenticator
    pub downstream: u64,
    /// Datagrams written to a socket
    pub forwarded: u64,
    /// Downstream datagrams with no endpoint on their local port
    pub dropped_unmatched: u64,
    /// Active mode datagrams the codec could not decode
    pub dropped_decode: u64,
    /// Active mode packets the codec could not re-encode
    pub dropped_encode: u64,
    /// Packets the interceptor refused
    pub dropped_by_interceptor: u64,
    /// Socket writes that failed
    pub send_failures: u64,
    /// Client endpoints opened
    pub endpoints_created: u64,
    /// Client endpoints removed for inactivity
    pub endpoints_evicted: u64,
}

impl RelayStats {
    /// Datagrams received but not forwarded, for any reason
    pub fn dropped(&self) -> u64 {
        self.dropped_unmatched
            + self.dropped_decode
            + self.dropped_encode
            + self.dropped_by_interceptor
            + self.send_failures
    }
}
