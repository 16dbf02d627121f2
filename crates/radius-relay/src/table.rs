//! Peer-to-port mapping owned by the relay's central loop
//!
//! Every authenticator seen on the listening side gets a [`ClientEndpoint`]:
//! a socket of its own, bound to an allocated local port and connected to the
//! server port the authenticator originally targeted. Replies arriving on that
//! socket identify the authenticator by the local port alone.
//!
//! The table is plain data. Only the central loop touches it, so it carries
//! no locks.

use crate::error::{RelayError, RelayResult};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

/// Relay state for one authenticator address
#[derive(Debug)]
pub struct ClientEndpoint {
    /// Authenticator address (IP and source port)
    pub peer: SocketAddr,
    /// Local port the dedicated socket is bound to
    pub local_port: u16,
    /// Server port the authenticator originally sent to
    pub server_port: u16,
    socket: Arc<UdpSocket>,
    receiver: Option<JoinHandle<()>>,
    last_seen: Instant,
}

impl ClientEndpoint {
    pub fn new(peer: SocketAddr, local_port: u16, server_port: u16, socket: Arc<UdpSocket>) -> Self {
        ClientEndpoint {
            peer,
            local_port,
            server_port,
            socket,
            receiver: None,
            last_seen: Instant::now(),
        }
    }

    /// Tie the receive task's lifetime to this endpoint.
    pub fn attach_receiver(&mut self, handle: JoinHandle<()>) {
        self.receiver = Some(handle);
    }

    /// Dedicated socket, connected to the server
    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

impl Drop for ClientEndpoint {
    fn drop(&mut self) {
        if let Some(handle) = self.receiver.take() {
            handle.abort();
        }
    }
}

/// All live endpoints, indexed by peer address and by allocated port
#[derive(Debug, Default)]
pub struct SessionTable {
    by_peer: HashMap<SocketAddr, ClientEndpoint>,
    by_port: HashMap<u16, SocketAddr>,
    reserved: BTreeSet<u16>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that never hands out `ports`, e.g. the relay's own listening
    /// ports on the same address.
    pub fn reserving(ports: impl IntoIterator<Item = u16>) -> Self {
        SessionTable {
            reserved: ports.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    /// Exact match on IP and port
    pub fn find_by_peer(&mut self, peer: SocketAddr) -> Option<&mut ClientEndpoint> {
        self.by_peer.get_mut(&peer)
    }

    pub fn find_by_local_port(&mut self, port: u16) -> Option<&mut ClientEndpoint> {
        let peer = self.by_port.get(&port)?;
        self.by_peer.get_mut(peer)
    }

    pub fn is_port_allocated(&self, port: u16) -> bool {
        self.by_port.contains_key(&port) || self.reserved.contains(&port)
    }

    /// Pick a local port for a new peer.
    ///
    /// Starts at the peer's own source port and walks upwards past ports
    /// already held by an endpoint or reserved.
    pub fn allocate_port(&self, preferred: u16) -> RelayResult<u16> {
        let mut candidate = preferred;
        while self.is_port_allocated(candidate) {
            candidate = candidate
                .checked_add(1)
                .ok_or(RelayError::PortsExhausted { start: preferred })?;
        }
        Ok(candidate)
    }

    /// Add an endpoint. The caller must have obtained its port from
    /// [`allocate_port`](Self::allocate_port).
    pub fn insert(&mut self, endpoint: ClientEndpoint) -> &mut ClientEndpoint {
        let peer = endpoint.peer;
        let local_port = endpoint.local_port;
        self.by_port.insert(local_port, peer);

        match self.by_peer.entry(peer) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(endpoint);
                if previous.local_port != local_port {
                    self.by_port.remove(&previous.local_port);
                }
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(endpoint),
        }
    }

    /// Remove endpoints idle for longer than `idle_timeout`. Dropping the
    /// returned endpoints stops their receive tasks and closes their sockets.
    pub fn evict_idle(&mut self, now: Instant, idle_timeout: Duration) -> Vec<ClientEndpoint> {
        let expired: Vec<SocketAddr> = self
            .by_peer
            .values()
            .filter(|endpoint| endpoint.idle_for(now) > idle_timeout)
            .map(|endpoint| endpoint.peer)
            .collect();

        expired
            .into_iter()
            .filter_map(|peer| {
                let endpoint = self.by_peer.remove(&peer)?;
                self.by_port.remove(&endpoint.local_port);
                Some(endpoint)
            })
            .collect()
    }
}
