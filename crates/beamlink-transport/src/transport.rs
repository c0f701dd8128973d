//! Transport trait abstraction.
//!
//! The protocol engine never opens sockets itself. It asks a `PortResolver`
//! where a node listens and a `Connector` for a byte stream to that port,
//! so the same engine runs over TCP in production and over in-memory pipes
//! in tests.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport is closed
    #[error("Transport is closed")]
    Closed,

    /// Connection failed
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailed {
        /// Target host
        host: String,
        /// Target port
        port: u16,
        /// Failure description
        reason: String,
    },

    /// Name resolution failed
    #[error("Failed to resolve {node}: {reason}")]
    Resolve {
        /// Node name that was looked up
        node: String,
        /// Failure description
        reason: String,
    },

    /// The port mapper has no entry for the node
    #[error("Node {0} is not registered with the port mapper")]
    NodeNotRegistered(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A bidirectional byte stream to a peer node.
pub trait DistStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> DistStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens byte streams to `host:port`.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to a remote port.
    ///
    /// # Errors
    /// Returns `TransportError` if the connection cannot be established
    async fn connect(&self, host: &str, port: u16) -> TransportResult<Box<dyn DistStream>>;
}

/// Resolves a node name on a host to the port its distribution listener uses.
#[async_trait]
pub trait PortResolver: Send + Sync + 'static {
    /// Look up the distribution port of `name` on `host`.
    ///
    /// # Errors
    /// Returns `TransportError` if the lookup fails or the node is unknown
    async fn resolve_port(&self, name: &str, host: &str) -> TransportResult<u16>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::NodeNotRegistered("foo".into());
        assert_eq!(
            err.to_string(),
            "Node foo is not registered with the port mapper"
        );

        let err = TransportError::ConnectionFailed {
            host: "localhost".into(),
            port: 4369,
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Connection to localhost:4369 failed: refused"
        );
    }
}
