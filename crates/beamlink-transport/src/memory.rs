//! In-memory connector.
//!
//! Each `connect` creates a `tokio::io::duplex` pipe: one end is returned to
//! the caller, the other is handed to whoever holds the receiver, which can
//! then play the remote node byte for byte.

use crate::transport::{Connector, DistStream, TransportError, TransportResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Default pipe capacity in bytes
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Remote end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Host the client asked for
    pub host: String,
    /// Port the client asked for
    pub port: u16,
    /// Stream connected to the client
    pub stream: DuplexStream,
}

/// Connector that produces in-memory pipes.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    refuse: Arc<AtomicBool>,
    capacity: usize,
}

impl MemoryConnector {
    /// Create a connector and the receiver that yields remote ends.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            refuse: Arc::new(AtomicBool::new(false)),
            capacity: DEFAULT_PIPE_CAPACITY,
        };
        (connector, rx)
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, host: &str, port: u16) -> TransportResult<Box<dyn DistStream>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                reason: "refused".to_string(),
            });
        }

        let (local, remote) = tokio::io::duplex(self.capacity);
        self.peers
            .send(MemoryPeer {
                host: host.to_string(),
                port,
                stream: remote,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(Box::new(local))
    }
}
