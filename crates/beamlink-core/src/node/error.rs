//! Error types for the node runtime API.

use crate::error::NodeIdError;
use beamlink_transport::TransportError;
use thiserror::Error;

/// Errors returned by `Node` operations
#[derive(Debug, Error)]
pub enum NodeError {
    /// A pid or node name is not `name@host`
    #[error(transparent)]
    InvalidNodeId(#[from] NodeIdError),

    /// The runtime task has stopped
    #[error("node runtime stopped")]
    RuntimeStopped,

    /// Resolving or connecting to a peer failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
