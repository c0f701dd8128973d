//! Async node runtime.
//!
//! Drives a `ConnectionManager` over real (or in-memory) transports:
//!
//! ```text
//! ┌──────────────┐   commands    ┌──────────────────────────┐   bytes   ┌─────────────────┐
//! │  Node handle │ ────────────▶ │  runtime task            │ ◀───────▶ │ connection task │──▶ stream
//! └──────────────┘               │  ConnectionManager       │           └─────────────────┘
//!        ▲                       │  LocalDelivery           │
//!        └──── NodeEvent ─────── └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use beamlink_core::node::{ChannelDelivery, Node};
//! use beamlink_core::{Cookie, DistConfig};
//! use beamlink_transport::{EpmdResolver, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DistConfig::new("client@localhost".parse()?, Cookie::load_default()?);
//!     let (delivery, _inbox) = ChannelDelivery::new();
//!     let node = Node::start(
//!         config,
//!         Arc::new(TcpConnector::new()),
//!         Arc::new(EpmdResolver::new()),
//!         delivery,
//!     );
//!
//!     let me = node.make_pid();
//!     node.reg_send(
//!         "server@localhost".parse()?,
//!         me,
//!         eetf::Atom::from("logger"),
//!         eetf::Term::from(eetf::Atom::from("hello")),
//!     )?;
//!     node.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod delivery;
pub mod error;
pub mod runtime;

pub use delivery::{ChannelDelivery, DeliveryError, LocalDelivery, LocalEvent};
pub use error::{NodeError, Result};
pub use runtime::{Node, NodeEvent, wait_for_event};
