//! # beamlink Core
//!
//! Client-side engine for the Erlang distribution protocol.
//!
//! This crate provides:
//! - Length-prefixed framing with tick (keepalive) handling
//! - Handshake state machine with cookie challenge/response
//! - Control message decoding and dispatch (`link`, `send`, `exit`, `unlink`, `reg_send`)
//! - Request queueing until the connection is authenticated
//! - Link bookkeeping for `noconnection` exits on disconnect
//! - An async `node` runtime driving connections over any `Connector`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Node (async runtime)                          │
//! │   (owns transports, executes effects, local delivery hooks)     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                    ConnectionManager                             │
//! │   (one Connection per NodeId, request routing, lifecycle)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          Handshake  │  Control dispatch  │  Link registry        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Framer                                   │
//! │   (u16 length before authentication, u32 after)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything below `Node` is sans-IO: inputs are bytes and events, outputs
//! are `Effect` values the caller executes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod connection;
pub mod control;
pub mod effect;
pub mod error;
pub mod flags;
pub mod framer;
pub mod handshake;
pub mod links;
pub mod manager;
pub mod node;
pub mod node_id;
pub mod operation;
pub mod term;

pub use config::DistConfig;
pub use connection::{Connection, ConnectionId};
pub use control::ControlMessage;
pub use effect::{Effect, Recipient};
pub use error::{
    ConnectionError, ControlError, FrameError, HandshakeError, NodeIdError, TermError,
};
pub use flags::DistributionFlags;
pub use framer::{Framer, HeaderWidth};
pub use handshake::{Handshake, HandshakeState, HandshakeStep, PeerInfo};
pub use links::{LinkEntry, LinkRegistry};
pub use manager::ConnectionManager;
pub use node_id::NodeId;
pub use operation::Operation;

pub use beamlink_crypto::Cookie;

/// Distribution protocol version written in the name message
pub const DISTRIBUTION_VERSION: u32 = 6;

/// Challenge this client asks the peer to sign
pub const PROBE_CHALLENGE: u32 = 42;

/// Pass-through marker opening every live-phase data frame
pub const PASS_THROUGH: u8 = b'p';
