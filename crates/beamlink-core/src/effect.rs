//! Effects produced by the sans-IO engine.
//!
//! `Connection` and `ConnectionManager` never perform I/O. Each handler
//! returns a list of effects which the caller executes in order.

use crate::connection::ConnectionId;
use crate::error::ConnectionError;
use crate::handshake::PeerInfo;
use crate::node_id::NodeId;
use bytes::Bytes;
use eetf::{Atom, Pid, Term};

/// Target of a local delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    /// A local process
    Pid(Pid),
    /// A locally registered name
    Name(Atom),
}

/// Work the caller must carry out on behalf of the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Resolve `node` and open a transport for `connection`
    Connect {
        /// Peer node
        node: NodeId,
        /// Connection the transport belongs to
        connection: ConnectionId,
    },

    /// Write already-framed bytes
    Transmit {
        /// Peer node
        node: NodeId,
        /// Connection to write on
        connection: ConnectionId,
        /// Framed bytes
        bytes: Bytes,
    },

    /// Close the transport
    Close {
        /// Peer node
        node: NodeId,
        /// Connection to close
        connection: ConnectionId,
    },

    /// Hand a message to a local process or name
    Deliver {
        /// Recipient
        to: Recipient,
        /// Message term
        message: Term,
    },

    /// Exit signal for a local process
    Exit {
        /// Local process
        to: Pid,
        /// Remote process the signal is attributed to
        from: Pid,
        /// Exit reason
        reason: Term,
    },

    /// A remote process linked to a local one
    AddLink {
        /// Local process
        local: Pid,
        /// Remote process
        remote: Pid,
    },

    /// A remote process unlinked from a local one
    RemoveLink {
        /// Local process
        local: Pid,
        /// Remote process
        remote: Pid,
    },

    /// Connection authenticated
    NodeUp {
        /// Peer node
        node: NodeId,
        /// What the peer sent in its challenge
        peer: PeerInfo,
    },

    /// Connection torn down
    NodeDown {
        /// Peer node
        node: NodeId,
        /// Why
        reason: ConnectionError,
    },
}
