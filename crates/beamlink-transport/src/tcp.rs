//! TCP connector using tokio.

use crate::transport::{Connector, DistStream, TransportError, TransportResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens TCP connections with `TCP_NODELAY` set.
///
/// # Examples
///
/// ```no_run
/// use beamlink_transport::{Connector, TcpConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = TcpConnector::new();
/// let stream = connector.connect("127.0.0.1", 45123).await?;
/// # drop(stream);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a connector with a custom connect timeout.
    #[must_use]
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Configured connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect and return the concrete `TcpStream`.
    ///
    /// # Errors
    /// Returns `TransportError::Timeout` or `TransportError::ConnectionFailed`
    pub async fn connect_tcp(&self, host: &str, port: u16) -> TransportResult<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?;

        stream.set_nodelay(true)?;
        tracing::debug!("Connected to {}:{}", host, port);
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> TransportResult<Box<dyn DistStream>> {
        let stream = self.connect_tcp(host, port).await?;
        Ok(Box::new(stream))
    }
}
