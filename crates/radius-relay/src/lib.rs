//! RADIUS Man-in-the-Middle Relay
//!
//! This crate sits between RADIUS authenticators (NAS devices) and their
//! authenticator server. Every authenticator gets a dedicated server-facing
//! socket, so replies can be routed back without inspecting them.
//!
//! # Features
//!
//! - Passive mode: datagrams are forwarded byte for byte
//! - Active mode: packets are decoded, handed to a [`PacketInterceptor`]
//!   that may rewrite or drop them, then re-encoded
//! - Optional eviction of idle client endpoints
//! - JSON configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_relay::{Mode, RelayEngine, Session};
//! use radius_proto::Packet;
//! use std::net::SocketAddr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::configure(Mode::Active, "192.168.1.10".parse()?, [1812, 1813]);
//!     let engine = RelayEngine::new(session);
//!
//!     let stats = engine
//!         .run(|packet: &mut Packet, from: SocketAddr, to: SocketAddr| {
//!             println!("{:?} {} -> {}", packet.code, from, to);
//!             true
//!         })
//!         .await?;
//!     println!("{stats:?}");
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod interceptor;
pub mod session;
pub mod stats;
pub mod table;

pub use codec::{PacketCodec, RadiusCodec};
pub use config::{Config, ConfigError, LoadOutcome};
pub use engine::{RelayEngine, ShutdownHandle};
pub use error::{RelayError, RelayResult};
pub use interceptor::{LoggingInterceptor, PacketInterceptor};
pub use session::{Direction, Mode, Session};
pub use stats::RelayStats;
pub use table::{ClientEndpoint, SessionTable};
