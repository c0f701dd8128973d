//! Distribution configuration.

use crate::flags::DistributionFlags;
use crate::node_id::NodeId;
use crate::{DISTRIBUTION_VERSION, PROBE_CHALLENGE};
use beamlink_crypto::Cookie;
use std::time::Duration;

/// Default handshake deadline
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default transport read buffer size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024;

/// Default ceiling on an incoming frame's payload
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Configuration shared by every connection of a local node.
///
/// Read-only once the node is started.
#[derive(Debug, Clone)]
pub struct DistConfig {
    /// Local node identifier, sent in the name message
    pub node_name: NodeId,

    /// Shared secret
    pub cookie: Cookie,

    /// Capabilities advertised to peers
    pub flags: DistributionFlags,

    /// Value written in the name message's version field
    pub version: u32,

    /// Challenge this node asks peers to sign
    pub own_challenge: u32,

    /// Deadline for reaching `Live` after connect (`None` waits forever)
    pub handshake_timeout: Option<Duration>,

    /// Bytes read from the transport per call
    pub read_buffer_size: usize,

    /// Largest incoming frame payload before the peer is disconnected
    pub max_frame_size: usize,

    /// Mirror every frame to the `beamlink::wire` trace target
    pub trace_traffic: bool,
}

impl DistConfig {
    /// Configuration with default flags and timeouts
    #[must_use]
    pub fn new(node_name: NodeId, cookie: Cookie) -> Self {
        Self {
            node_name,
            cookie,
            flags: DistributionFlags::client_default(),
            version: DISTRIBUTION_VERSION,
            own_challenge: PROBE_CHALLENGE,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            trace_traffic: false,
        }
    }

    /// Set advertised flags
    #[must_use]
    pub fn with_flags(mut self, flags: DistributionFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the handshake deadline
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Enable or disable traffic mirroring
    #[must_use]
    pub fn with_trace_traffic(mut self, enabled: bool) -> Self {
        self.trace_traffic = enabled;
        self
    }

    /// Set the read buffer size
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the incoming frame size limit
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Creation stamped on local pids and references.
    ///
    /// Peers store the name message's version field as this node's
    /// creation, so the two must agree.
    #[must_use]
    pub fn creation(&self) -> u32 {
        self.version
    }
}
