//! # beamlink Transport
//!
//! Byte-stream transport and node name resolution for the Erlang
//! distribution client.
//!
//! This crate provides:
//! - `Connector` / `PortResolver` traits consumed by the protocol engine
//! - TCP connector built on tokio
//! - EPMD (`PORT_PLEASE2`) resolver
//! - In-memory connector for driving the engine without sockets

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod epmd;
pub mod memory;
pub mod resolver;
pub mod tcp;
pub mod transport;

pub use epmd::{DEFAULT_EPMD_PORT, EpmdResolver, NodeEntry};
pub use memory::{MemoryConnector, MemoryPeer};
pub use resolver::StaticResolver;
pub use tcp::TcpConnector;
pub use transport::{Connector, DistStream, PortResolver, TransportError, TransportResult};
