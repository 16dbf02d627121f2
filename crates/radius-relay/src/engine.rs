//! The relay engine
//!
//! One receive task per socket pushes [`RelayEvent`]s into a single unbounded
//! channel. A central loop drains that channel in order and is the only code
//! that touches the [`SessionTable`], so no locking is needed.
//!
//! ```text
//!  authenticator ──► listener :1812 ──┐
//!                                     ├─► central loop ──► endpoint socket ──► server :1812
//!  server ──► endpoint socket :p ─────┘                └─► listener :1812 ──► authenticator
//! ```

use crate::codec::{PacketCodec, RadiusCodec};
use crate::error::{RelayError, RelayResult};
use crate::interceptor::PacketInterceptor;
use crate::session::{Direction, Mode, Session};
use crate::stats::RelayStats;
use crate::table::{ClientEndpoint, SessionTable};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Large enough for any UDP payload
const RECV_BUFFER_SIZE: usize = 65_535;

/// Shortest pause between idle sweeps
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// A datagram read by a receive task
#[derive(Debug)]
pub struct InboundDatagram {
    pub payload: Vec<u8>,
    pub sender: SocketAddr,
    /// Local port of the socket that received it
    pub local_port: u16,
}

/// What receive tasks report to the central loop
#[derive(Debug)]
pub enum RelayEvent {
    Datagram(InboundDatagram),
    /// A socket read failed; ends the run
    TransportFailed { local_port: u16, error: io::Error },
}

/// Stops a running [`RelayEngine`]. Cheap to clone.
///
/// The signal is sticky: once sent, any later `run` on the same engine
/// returns immediately.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// UDP relay between authenticators and one authenticator server
pub struct RelayEngine<C = RadiusCodec> {
    session: Session,
    listen_ip: IpAddr,
    codec: C,
    idle_timeout: Option<Duration>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RelayEngine<RadiusCodec> {
    pub fn new(session: Session) -> Self {
        let (shutdown, _) = watch::channel(false);
        RelayEngine {
            session,
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            codec: RadiusCodec,
            idle_timeout: None,
            shutdown: Arc::new(shutdown),
        }
    }
}

impl<C: PacketCodec> RelayEngine<C> {
    /// Address the listeners and endpoint sockets bind to (default `0.0.0.0`)
    pub fn with_listen_ip(mut self, listen_ip: IpAddr) -> Self {
        self.listen_ip = listen_ip;
        self
    }

    /// Codec used in active mode
    pub fn with_codec<D: PacketCodec>(self, codec: D) -> RelayEngine<D> {
        RelayEngine {
            session: self.session,
            listen_ip: self.listen_ip,
            codec,
            idle_timeout: self.idle_timeout,
            shutdown: self.shutdown,
        }
    }

    /// Evict client endpoints after this much inactivity. `None` keeps them
    /// for the whole run.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Relay until shut down or until a socket fails.
    ///
    /// Returns the run's statistics on shutdown. Bind, connect and read
    /// failures end the run with an error; per-datagram problems are logged
    /// and counted.
    pub async fn run<I>(&self, mut interceptor: I) -> RelayResult<RelayStats>
    where
        I: PacketInterceptor<C::Packet>,
    {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return Ok(RelayStats::default());
        }

        let ports: Vec<u16> = self.session.ports().collect();
        if ports.is_empty() {
            return Err(RelayError::NoPorts);
        }

        let (events, mut events_rx) = mpsc::unbounded_channel();
        let mut relay = Relay {
            session: &self.session,
            codec: &self.codec,
            listen_ip: self.listen_ip,
            table: SessionTable::reserving(ports.iter().copied()),
            listeners: HashMap::new(),
            listener_tasks: Vec::new(),
            events,
            stats: RelayStats::default(),
        };
        relay.bind_listeners(&ports).await?;

        info!(
            mode = ?self.session.mode(),
            host = %self.session.host(),
            ports = ?ports,
            listen_ip = %self.listen_ip,
            "Relay running"
        );

        relay
            .drive(&mut events_rx, &mut shutdown_rx, self.idle_timeout, &mut interceptor)
            .await
    }
}

fn sweep_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).max(MIN_SWEEP_PERIOD)
}

async fn next_sweep(sweep: &mut Option<(Interval, Duration)>) -> Duration {
    match sweep {
        Some((interval, timeout)) => {
            interval.tick().await;
            *timeout
        }
        None => std::future::pending().await,
    }
}

/// Errors an ICMP unreachable leaves on a UDP socket. The socket itself is
/// still usable.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

fn spawn_receiver(
    socket: Arc<UdpSocket>,
    local_port: u16,
    events: mpsc::UnboundedSender<RelayEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, sender)) => {
                    let datagram = InboundDatagram {
                        payload: buf[..len].to_vec(),
                        sender,
                        local_port,
                    };
                    if events.send(RelayEvent::Datagram(datagram)).is_err() {
                        break;
                    }
                }
                Err(e) if is_transient(&e) => {
                    debug!(local_port, error = %e, "Ignoring ICMP error on socket");
                }
                Err(error) => {
                    let _ = events.send(RelayEvent::TransportFailed { local_port, error });
                    break;
                }
            }
        }
    })
}

/// State owned by the central loop for one run
struct Relay<'a, C> {
    session: &'a Session,
    codec: &'a C,
    listen_ip: IpAddr,
    table: SessionTable,
    /// Listening sockets by configured port
    listeners: HashMap<u16, Arc<UdpSocket>>,
    listener_tasks: Vec<JoinHandle<()>>,
    events: mpsc::UnboundedSender<RelayEvent>,
    stats: RelayStats,
}

impl<C> Drop for Relay<'_, C> {
    fn drop(&mut self) {
        for task in &self.listener_tasks {
            task.abort();
        }
    }
}

impl<C: PacketCodec> Relay<'_, C> {
    async fn bind_listeners(&mut self, ports: &[u16]) -> RelayResult<()> {
        for &port in ports {
            let addr = SocketAddr::new(self.listen_ip, port);
            let socket = UdpSocket::bind(addr)
                .await
                .map_err(|source| RelayError::Bind { addr, source })?;
            let socket = Arc::new(socket);
            debug!(%addr, "Listening");

            self.listener_tasks
                .push(spawn_receiver(Arc::clone(&socket), port, self.events.clone()));
            self.listeners.insert(port, socket);
        }
        Ok(())
    }

    /// Central loop: drain events in order until shutdown or a fatal error.
    async fn drive<I>(
        &mut self,
        events_rx: &mut mpsc::UnboundedReceiver<RelayEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
        idle_timeout: Option<Duration>,
        interceptor: &mut I,
    ) -> RelayResult<RelayStats>
    where
        I: PacketInterceptor<C::Packet>,
    {
        let mut sweep = idle_timeout.map(|timeout| {
            let mut interval = time::interval(sweep_period(timeout));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            (interval, timeout)
        });

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow_and_update() {
                        info!(stats = ?self.stats, "Relay shutting down");
                        return Ok(self.stats.clone());
                    }
                }

                event = events_rx.recv() => match event {
                    Some(RelayEvent::Datagram(datagram)) => {
                        self.handle(datagram, interceptor).await?;
                    }
                    Some(RelayEvent::TransportFailed { local_port, error }) => {
                        error!(local_port, error = %error, "Socket read failed");
                        return Err(RelayError::Transport {
                            local_port,
                            source: error,
                        });
                    }
                    None => return Err(RelayError::ChannelClosed),
                },

                timeout = next_sweep(&mut sweep) => {
                    self.evict_idle(timeout);
                }
            }
        }
    }

    async fn handle<I>(&mut self, datagram: InboundDatagram, interceptor: &mut I) -> RelayResult<()>
    where
        I: PacketInterceptor<C::Packet>,
    {
        self.stats.datagrams_received += 1;
        trace!(
            sender = %datagram.sender,
            local_port = datagram.local_port,
            payload = %hex::encode(&datagram.payload),
            "Datagram received"
        );

        match self.session.classify(datagram.sender) {
            Direction::Downstream => {
                self.forward_downstream(datagram, interceptor).await;
                Ok(())
            }
            Direction::Upstream => self.forward_upstream(datagram, interceptor).await,
        }
    }

    /// Server to authenticator. The reply goes out through the listener the
    /// authenticator originally sent to, so it sees the expected source port.
    async fn forward_downstream<I>(&mut self, datagram: InboundDatagram, interceptor: &mut I)
    where
        I: PacketInterceptor<C::Packet>,
    {
        self.stats.downstream += 1;
        let server = datagram.sender;

        let Some(endpoint) = self.table.find_by_local_port(datagram.local_port) else {
            debug!(
                %server,
                local_port = datagram.local_port,
                "No client endpoint for reply, dropping"
            );
            self.stats.dropped_unmatched += 1;
            return;
        };
        endpoint.touch(Instant::now());
        let peer = endpoint.peer;

        let Some(listener) = self.listeners.get(&server.port()).cloned() else {
            self.stats.dropped_unmatched += 1;
            return;
        };

        let Some(payload) = self.transform(datagram.payload, server, peer, interceptor) else {
            return;
        };
        match listener.send_to(&payload, peer).await {
            Ok(_) => {
                self.stats.forwarded += 1;
                debug!(%server, %peer, len = payload.len(), "Forwarded reply");
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(%peer, error = %e, "Failed to send reply");
            }
        }
    }

    /// Authenticator to server, through the peer's dedicated socket
    async fn forward_upstream<I>(
        &mut self,
        datagram: InboundDatagram,
        interceptor: &mut I,
    ) -> RelayResult<()>
    where
        I: PacketInterceptor<C::Packet>,
    {
        self.stats.upstream += 1;
        let session = self.session;
        let peer = datagram.sender;

        let (socket, server_port) = match self.table.find_by_peer(peer) {
            Some(endpoint) => {
                endpoint.touch(Instant::now());
                (Arc::clone(endpoint.socket()), endpoint.server_port)
            }
            None => {
                let endpoint = self.open_endpoint(peer, datagram.local_port).await?;
                (Arc::clone(endpoint.socket()), endpoint.server_port)
            }
        };
        let server = session.server_addr(server_port);

        let Some(payload) = self.transform(datagram.payload, peer, server, interceptor) else {
            return Ok(());
        };
        match socket.send(&payload).await {
            Ok(_) => {
                self.stats.forwarded += 1;
                debug!(%peer, %server, len = payload.len(), "Forwarded request");
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(%server, error = %e, "Failed to send request");
            }
        }
        Ok(())
    }

    async fn open_endpoint(
        &mut self,
        peer: SocketAddr,
        server_port: u16,
    ) -> RelayResult<&mut ClientEndpoint> {
        let local_port = self.table.allocate_port(peer.port())?;

        let addr = SocketAddr::new(self.listen_ip, local_port);
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;

        let server = self.session.server_addr(server_port);
        socket
            .connect(server)
            .await
            .map_err(|source| RelayError::Connect {
                addr: server,
                source,
            })?;

        let socket = Arc::new(socket);
        let receiver = spawn_receiver(Arc::clone(&socket), local_port, self.events.clone());
        let mut endpoint = ClientEndpoint::new(peer, local_port, server_port, socket);
        endpoint.attach_receiver(receiver);

        self.stats.endpoints_created += 1;
        info!(%peer, local_port, %server, "Opened client endpoint");
        Ok(self.table.insert(endpoint))
    }

    /// Apply the session mode. `None` means the datagram is dropped.
    fn transform<I>(
        &mut self,
        payload: Vec<u8>,
        from: SocketAddr,
        to: SocketAddr,
        interceptor: &mut I,
    ) -> Option<Vec<u8>>
    where
        I: PacketInterceptor<C::Packet>,
    {
        if self.session.mode() == Mode::Passive {
            return Some(payload);
        }

        let mut packet = match self.codec.decode(&payload) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.dropped_decode += 1;
                debug!(%from, %to, error = %e, "Undecodable datagram, dropping");
                return None;
            }
        };

        if !interceptor.decide(&mut packet, from, to) {
            self.stats.dropped_by_interceptor += 1;
            debug!(%from, %to, "Interceptor dropped packet");
            return None;
        }

        match self.codec.encode(&packet) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                self.stats.dropped_encode += 1;
                warn!(%from, %to, error = %e, "Failed to re-encode packet, dropping");
                None
            }
        }
    }

    fn evict_idle(&mut self, idle_timeout: Duration) {
        let evicted = self.table.evict_idle(Instant::now(), idle_timeout);
        for endpoint in &evicted {
            info!(
                peer = %endpoint.peer,
                local_port = endpoint.local_port,
                "Evicted idle client endpoint"
            );
        }
        self.stats.endpoints_evicted += evicted.len() as u64;
    }
}
