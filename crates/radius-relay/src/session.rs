//! Relay session configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

/// How the relay treats traffic it forwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward raw bytes unchanged
    #[default]
    Passive,
    /// Decode, hand to the interceptor, re-encode
    Active,
}

/// Which way a datagram is travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Authenticator towards authenticator server
    Upstream,
    /// Authenticator server towards authenticator
    Downstream,
}

/// Target of a relay run: the authenticator server and the ports it serves.
///
/// Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    mode: Mode,
    host: IpAddr,
    ports: BTreeSet<u16>,
}

impl Session {
    /// Build a session. No I/O and no validation beyond collapsing duplicate
    /// ports.
    pub fn configure(mode: Mode, host: IpAddr, ports: impl IntoIterator<Item = u16>) -> Self {
        Session {
            mode,
            host,
            ports: ports.into_iter().collect(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }

    pub fn has_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    /// Server address for one of the target ports
    pub fn server_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }

    /// Traffic from the host on one of the target ports is downstream;
    /// everything else, including the host on another port, is upstream.
    /// IPv4-mapped IPv6 senders (dual-stack listeners) match an IPv4 host.
    pub fn classify(&self, sender: SocketAddr) -> Direction {
        let from_host = sender.ip().to_canonical() == self.host.to_canonical();
        if from_host && self.has_port(sender.port()) {
            Direction::Downstream
        } else {
            Direction::Upstream
        }
    }
}
