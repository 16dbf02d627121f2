//! End-to-End Relay Tests
//!
//! Each test runs a relay between a fake authenticator and a fake
//! authenticator server, all on loopback:
//!
//! - server:        127.0.0.2:P
//! - relay:         127.0.0.1:P (listener) and 127.0.0.1:<allocated> (endpoints)
//! - authenticator: 127.0.0.3:<ephemeral>
//!
//! Tests cover:
//! - Passive byte-for-byte forwarding in both directions
//! - Active mode decode and encode failures, interceptor drops and rewrites
//! - Direction classification and unmatched replies
//! - Idle endpoint eviction and graceful shutdown

use radius_proto::{Attribute, AttributeType, Code, Packet};
use radius_relay::{
    Mode, PacketInterceptor, RelayEngine, RelayResult, RelayStats, Session, ShutdownHandle,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep, timeout};

const SERVER_IP: &str = "127.0.0.2";
const RELAY_IP: &str = "127.0.0.1";
const CLIENT_IP: &str = "127.0.0.3";

struct Harness {
    server: UdpSocket,
    client: UdpSocket,
    relay_addr: SocketAddr,
    shutdown: ShutdownHandle,
    run: JoinHandle<RelayResult<RelayStats>>,
}

impl Harness {
    async fn start<I>(mode: Mode, idle_timeout: Option<Duration>, interceptor: I) -> Self
    where
        I: PacketInterceptor<Packet> + 'static,
    {
        let server = UdpSocket::bind((SERVER_IP, 0))
            .await
            .expect("Failed to bind server");
        let port = server.local_addr().expect("Server address").port();

        let host: IpAddr = SERVER_IP.parse().unwrap();
        let listen_ip: IpAddr = RELAY_IP.parse().unwrap();
        let engine = RelayEngine::new(Session::configure(mode, host, [port]))
            .with_listen_ip(listen_ip)
            .with_idle_timeout(idle_timeout);
        let shutdown = engine.shutdown_handle();
        let run = tokio::spawn(async move { engine.run(interceptor).await });

        // Give the relay time to bind its listener
        sleep(Duration::from_millis(100)).await;

        let client = UdpSocket::bind((CLIENT_IP, 0))
            .await
            .expect("Failed to bind client");

        Harness {
            server,
            client,
            relay_addr: SocketAddr::new(listen_ip, port),
            shutdown,
            run,
        }
    }

    fn client_addr(&self) -> SocketAddr {
        self.client.local_addr().expect("Client address")
    }

    fn server_addr(&self) -> SocketAddr {
        self.server.local_addr().expect("Server address")
    }

    async fn stop(self) -> RelayStats {
        // Let in-flight datagrams reach the central loop first
        sleep(Duration::from_millis(100)).await;
        self.shutdown.shutdown();
        timeout(Duration::from_secs(5), self.run)
            .await
            .expect("Relay did not stop")
            .expect("Relay task panicked")
            .expect("Relay failed")
    }
}

async fn recv(socket: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 4096];
    let (len, from) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("Timed out waiting for datagram")
        .expect("recv_from failed");
    buf.truncate(len);
    (buf, from)
}

async fn assert_silent(socket: &UdpSocket) {
    let mut buf = vec![0u8; 4096];
    assert!(
        timeout(Duration::from_millis(200), socket.recv_from(&mut buf))
            .await
            .is_err(),
        "Unexpected datagram"
    );
}

fn access_request(id: u8, username: &str) -> Packet {
    let mut packet = Packet::new(Code::AccessRequest, id, [id; 16]);
    packet.add_attribute(
        Attribute::string(AttributeType::UserName as u8, username)
            .expect("Failed to create User-Name"),
    );
    packet.add_attribute(
        Attribute::new(AttributeType::NasIpAddress as u8, vec![127, 0, 0, 3])
            .expect("Failed to create NAS-IP-Address"),
    );
    packet
}

fn username(packet: &Packet) -> Option<String> {
    packet
        .find_attribute(AttributeType::UserName as u8)
        .and_then(|attr| attr.as_string().ok())
}

fn forward_all(_: &mut Packet, _: SocketAddr, _: SocketAddr) -> bool {
    true
}

#[tokio::test]
async fn test_passive_round_trip() {
    let harness = Harness::start(Mode::Passive, None, forward_all).await;

    // Passive mode does not care whether this is RADIUS
    harness
        .client
        .send_to(b"not a radius packet", harness.relay_addr)
        .await
        .unwrap();
    let (payload, endpoint) = recv(&harness.server).await;
    assert_eq!(payload, b"not a radius packet");
    assert_eq!(endpoint.ip(), RELAY_IP.parse::<IpAddr>().unwrap());

    harness.server.send_to(b"reply", endpoint).await.unwrap();
    let (payload, from) = recv(&harness.client).await;
    assert_eq!(payload, b"reply");
    // The reply comes from the address the authenticator sent to
    assert_eq!(from, harness.relay_addr);

    let stats = harness.stop().await;
    assert_eq!(stats.upstream, 1);
    assert_eq!(stats.downstream, 1);
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.endpoints_created, 1);
    assert_eq!(stats.dropped(), 0);
}

#[tokio::test]
async fn test_same_peer_reuses_endpoint() {
    let harness = Harness::start(Mode::Passive, None, forward_all).await;

    harness.client.send_to(b"one", harness.relay_addr).await.unwrap();
    let (_, first) = recv(&harness.server).await;
    harness.client.send_to(b"two", harness.relay_addr).await.unwrap();
    let (payload, second) = recv(&harness.server).await;
    assert_eq!(payload, b"two");
    assert_eq!(first, second);

    // A second authenticator gets its own endpoint
    let other = UdpSocket::bind((CLIENT_IP, 0)).await.unwrap();
    other.send_to(b"three", harness.relay_addr).await.unwrap();
    let (_, third) = recv(&harness.server).await;
    assert_ne!(third, first);

    harness.server.send_to(b"for other", third).await.unwrap();
    let (payload, _) = recv(&other).await;
    assert_eq!(payload, b"for other");
    assert_silent(&harness.client).await;

    let stats = harness.stop().await;
    assert_eq!(stats.endpoints_created, 2);
}

#[tokio::test]
async fn test_active_drops_undecodable_and_keeps_running() {
    let harness = Harness::start(Mode::Active, None, forward_all).await;

    harness
        .client
        .send_to(&[0xFF; 10], harness.relay_addr)
        .await
        .unwrap();

    let request = access_request(1, "alice");
    harness
        .client
        .send_to(&request.encode().unwrap(), harness.relay_addr)
        .await
        .unwrap();

    // Only the valid packet arrives, unchanged
    let (payload, _) = recv(&harness.server).await;
    assert_eq!(Packet::decode(&payload).unwrap(), request);
    assert_silent(&harness.server).await;

    let stats = harness.stop().await;
    assert_eq!(stats.dropped_decode, 1);
    assert_eq!(stats.forwarded, 1);
}

#[tokio::test]
async fn test_active_drops_unencodable_and_keeps_running() {
    // Grow identifier 1 past the maximum RADIUS packet size
    let inflate = |packet: &mut Packet, _: SocketAddr, _: SocketAddr| {
        if packet.identifier == 1 {
            for _ in 0..20 {
                packet.add_attribute(
                    Attribute::new(AttributeType::ReplyMessage as u8, vec![0; 253]).unwrap(),
                );
            }
        }
        true
    };
    let harness = Harness::start(Mode::Active, None, inflate).await;

    for request in [access_request(1, "alice"), access_request(2, "bob")] {
        harness
            .client
            .send_to(&request.encode().unwrap(), harness.relay_addr)
            .await
            .unwrap();
    }

    let (payload, _) = recv(&harness.server).await;
    let received = Packet::decode(&payload).unwrap();
    assert_eq!(received.identifier, 2);
    assert_eq!(username(&received).as_deref(), Some("bob"));
    assert_silent(&harness.server).await;

    let stats = harness.stop().await;
    assert_eq!(stats.dropped_encode, 1);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(stats.upstream, 2);
}

#[tokio::test]
async fn test_interceptor_denial_drops_packet() {
    let deny_mallory = |packet: &mut Packet, _: SocketAddr, _: SocketAddr| {
        username(packet).as_deref() != Some("mallory")
    };
    let harness = Harness::start(Mode::Active, None, deny_mallory).await;

    for request in [access_request(1, "mallory"), access_request(2, "alice")] {
        harness
            .client
            .send_to(&request.encode().unwrap(), harness.relay_addr)
            .await
            .unwrap();
    }

    let (payload, _) = recv(&harness.server).await;
    let received = Packet::decode(&payload).unwrap();
    assert_eq!(received.identifier, 2);
    assert_eq!(username(&received).as_deref(), Some("alice"));
    assert_silent(&harness.server).await;

    let stats = harness.stop().await;
    assert_eq!(stats.dropped_by_interceptor, 1);
}

#[tokio::test]
async fn test_interceptor_mutation_is_visible_on_the_wire() {
    let seen: Arc<Mutex<Vec<(SocketAddr, SocketAddr)>>> = Arc::default();
    let record = Arc::clone(&seen);

    // Rename the user on the way in, turn rejects into accepts on the way out
    let rewrite = move |packet: &mut Packet, from: SocketAddr, to: SocketAddr| {
        record.lock().unwrap().push((from, to));
        match packet.code {
            Code::AccessRequest => {
                packet.remove_attributes(AttributeType::UserName as u8);
                packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "bob").unwrap());
            }
            Code::AccessReject => packet.code = Code::AccessAccept,
            _ => {}
        }
        true
    };
    let harness = Harness::start(Mode::Active, None, rewrite).await;

    harness
        .client
        .send_to(&access_request(7, "alice").encode().unwrap(), harness.relay_addr)
        .await
        .unwrap();
    let (payload, endpoint) = recv(&harness.server).await;
    let request = Packet::decode(&payload).unwrap();
    assert_eq!(username(&request).as_deref(), Some("bob"));
    assert_eq!(request.identifier, 7);

    let reject = Packet::new(Code::AccessReject, 7, [0xAB; 16]);
    harness
        .server
        .send_to(&reject.encode().unwrap(), endpoint)
        .await
        .unwrap();
    let (payload, _) = recv(&harness.client).await;
    let reply = Packet::decode(&payload).unwrap();
    assert_eq!(reply.code, Code::AccessAccept);
    assert_eq!(reply.authenticator, [0xAB; 16]);

    let client = harness.client_addr();
    let server = harness.server_addr();
    harness.stop().await;

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(client, server), (server, client)]);
}

#[tokio::test]
async fn test_unmatched_reply_is_dropped() {
    let harness = Harness::start(Mode::Passive, None, forward_all).await;

    // Server port on the host, but sent to the listener rather than an endpoint
    harness
        .server
        .send_to(b"stray", harness.relay_addr)
        .await
        .unwrap();
    assert_silent(&harness.client).await;

    let stats = harness.stop().await;
    assert_eq!(stats.downstream, 1);
    assert_eq!(stats.dropped_unmatched, 1);
    assert_eq!(stats.endpoints_created, 0);
}

#[tokio::test]
async fn test_host_on_other_port_is_upstream() {
    let harness = Harness::start(Mode::Passive, None, forward_all).await;

    let host_side = UdpSocket::bind((SERVER_IP, 0)).await.unwrap();
    host_side
        .send_to(b"from host, other port", harness.relay_addr)
        .await
        .unwrap();

    let (payload, _) = recv(&harness.server).await;
    assert_eq!(payload, b"from host, other port");

    let stats = harness.stop().await;
    assert_eq!(stats.upstream, 1);
    assert_eq!(stats.downstream, 0);
    assert_eq!(stats.endpoints_created, 1);
}

#[tokio::test]
async fn test_idle_endpoint_is_evicted_and_recreated() {
    let harness = Harness::start(Mode::Passive, Some(Duration::from_secs(1)), forward_all).await;

    harness.client.send_to(b"first", harness.relay_addr).await.unwrap();
    recv(&harness.server).await;

    // Idle past the timeout plus a sweep period
    sleep(Duration::from_millis(2500)).await;

    harness.client.send_to(b"second", harness.relay_addr).await.unwrap();
    let (payload, _) = recv(&harness.server).await;
    assert_eq!(payload, b"second");

    let stats = harness.stop().await;
    assert_eq!(stats.endpoints_evicted, 1);
    assert_eq!(stats.endpoints_created, 2);
}

#[tokio::test]
async fn test_shutdown_returns_stats() {
    let harness = Harness::start(Mode::Active, None, forward_all).await;
    let stats = harness.stop().await;
    assert_eq!(stats, RelayStats::default());
}
