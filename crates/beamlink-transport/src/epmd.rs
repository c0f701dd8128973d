//! EPMD (Erlang Port Mapper Daemon) client.
//!
//! Every host running distributed nodes runs an EPMD on port 4369. A client
//! asks it for the listening port of a node name with `PORT_PLEASE2_REQ`:
//!
//! ```text
//! Request:   [len: u16][122][name bytes]
//! Response:  [119][result: u8]
//!            result == 0 ->
//!            [port: u16][node type: u8][protocol: u8]
//!            [highest version: u16][lowest version: u16]
//!            [name len: u16][name][extra len: u16][extra]
//! ```
//!
//! EPMD closes the connection after answering.

use crate::tcp::TcpConnector;
use crate::transport::{PortResolver, TransportError, TransportResult};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Well-known EPMD port
pub const DEFAULT_EPMD_PORT: u16 = 4369;

/// `PORT_PLEASE2_REQ` request tag
pub const PORT_PLEASE2_REQ: u8 = 122;

/// `PORT2_RESP` response tag
pub const PORT2_RESP: u8 = 119;

/// Node type advertised by a normal (visible) node
pub const NODE_TYPE_NORMAL: u8 = 77;

/// Node type advertised by a hidden node
pub const NODE_TYPE_HIDDEN: u8 = 72;

/// Port mapper entry for a registered node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Distribution listen port
    pub port: u16,
    /// Node type (77 normal, 72 hidden)
    pub node_type: u8,
    /// Transport protocol (0 = TCP/IPv4)
    pub protocol: u8,
    /// Highest supported distribution version
    pub highest_version: u16,
    /// Lowest supported distribution version
    pub lowest_version: u16,
}

impl NodeEntry {
    /// Whether the node registered as hidden
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.node_type == NODE_TYPE_HIDDEN
    }
}

/// Resolves node ports by querying EPMD on the node's host.
#[derive(Debug, Clone)]
pub struct EpmdResolver {
    epmd_port: u16,
    connector: TcpConnector,
}

impl EpmdResolver {
    /// Resolver querying the default EPMD port.
    #[must_use]
    pub fn new() -> Self {
        Self::with_port(DEFAULT_EPMD_PORT)
    }

    /// Resolver querying a non-standard EPMD port.
    #[must_use]
    pub fn with_port(epmd_port: u16) -> Self {
        Self {
            epmd_port,
            connector: TcpConnector::new(),
        }
    }

    /// Use a specific connector (timeouts) for EPMD queries.
    #[must_use]
    pub fn with_connector(mut self, connector: TcpConnector) -> Self {
        self.connector = connector;
        self
    }

    /// Configured EPMD port.
    #[must_use]
    pub fn epmd_port(&self) -> u16 {
        self.epmd_port
    }

    /// Look up the full port mapper entry for `name` on `host`.
    ///
    /// # Errors
    /// Fails if EPMD is unreachable, answers malformed data, or does not
    /// know the node.
    pub async fn lookup(&self, name: &str, host: &str) -> TransportResult<NodeEntry> {
        let mut stream = self
            .connector
            .connect_tcp(host, self.epmd_port)
            .await
            .map_err(|e| TransportError::Resolve {
                node: format!("{name}@{host}"),
                reason: e.to_string(),
            })?;
        port_please(&mut stream, name).await
    }
}

impl Default for EpmdResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortResolver for EpmdResolver {
    async fn resolve_port(&self, name: &str, host: &str) -> TransportResult<u16> {
        let entry = self.lookup(name, host).await?;
        tracing::debug!(
            "EPMD on {} reports {} at port {} (versions {}..={})",
            host,
            name,
            entry.port,
            entry.lowest_version,
            entry.highest_version
        );
        Ok(entry.port)
    }
}

/// Encode a `PORT_PLEASE2_REQ` for `name`.
///
/// # Errors
/// Returns `TransportError::Resolve` if the name does not fit the length field.
pub fn encode_port_please(name: &str) -> TransportResult<Vec<u8>> {
    let len = u16::try_from(name.len() + 1).map_err(|_| TransportError::Resolve {
        node: name.to_string(),
        reason: "node name too long".to_string(),
    })?;
    let mut request = Vec::with_capacity(3 + name.len());
    request.extend_from_slice(&len.to_be_bytes());
    request.push(PORT_PLEASE2_REQ);
    request.extend_from_slice(name.as_bytes());
    Ok(request)
}

/// Run one `PORT_PLEASE2` exchange over an already connected stream.
///
/// # Errors
/// Returns `NodeNotRegistered` for a non-zero result code and `Resolve`
/// for an unexpected response tag.
pub async fn port_please<S>(stream: &mut S, name: &str) -> TransportResult<NodeEntry>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = encode_port_please(name)?;
    stream.write_all(&request).await?;
    stream.flush().await?;

    let tag = stream.read_u8().await?;
    if tag != PORT2_RESP {
        return Err(TransportError::Resolve {
            node: name.to_string(),
            reason: format!("unexpected EPMD response tag {tag}"),
        });
    }

    let result = stream.read_u8().await?;
    if result != 0 {
        return Err(TransportError::NodeNotRegistered(name.to_string()));
    }

    let port = stream.read_u16().await?;
    let node_type = stream.read_u8().await?;
    let protocol = stream.read_u8().await?;
    let highest_version = stream.read_u16().await?;
    let lowest_version = stream.read_u16().await?;

    Ok(NodeEntry {
        port,
        node_type,
        protocol,
        highest_version,
        lowest_version,
    })
}
