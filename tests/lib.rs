//! Shared harness for beamlink integration tests.
//!
//! `ScriptedPeer` plays the accepting side of a distribution connection
//! over an in-memory pipe, byte for byte, so tests can drive a real
//! `Node` without a running Erlang node.

use beamlink_core::node::{ChannelDelivery, LocalEvent, Node, NodeEvent};
use beamlink_core::{ControlMessage, DistConfig, DistributionFlags, NodeId};
use beamlink_crypto::{Cookie, Digest, gen_digest, verify_digest};
use beamlink_transport::{MemoryConnector, MemoryPeer, StaticResolver};
use eetf::Pid;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{broadcast, mpsc};

/// Node name the client runs as
pub const CLIENT: &str = "client@localhost";
/// Node name the scripted peer answers as
pub const SERVER: &str = "server@localhost";
/// Port the static resolver hands out for `SERVER`
pub const SERVER_PORT: u16 = 9100;
/// Cookie both sides share unless a test says otherwise
pub const COOKIE: &str = "integration-cookie";
/// How long tests wait for anything to happen
pub const STEP: Duration = Duration::from_secs(5);

/// Flags the peer advertises by default
pub const PEER_FLAGS: u64 = DistributionFlags::EXTENDED_REFERENCES
    | DistributionFlags::EXTENDED_PIDS_PORTS
    | DistributionFlags::BIG_CREATION
    | DistributionFlags::NEW_FLOATS
    | DistributionFlags::UTF8_ATOMS;

/// Client node wired to in-memory transport
pub struct TestClient {
    /// Running node
    pub node: Node,
    /// Node lifecycle events, subscribed before any traffic
    pub events: broadcast::Receiver<NodeEvent>,
    /// Everything delivered to local processes
    pub inbox: mpsc::UnboundedReceiver<LocalEvent>,
    /// Remote ends of every connection the node opens
    pub peers: mpsc::UnboundedReceiver<MemoryPeer>,
    /// Connector, for refusing connections
    pub connector: MemoryConnector,
}

impl TestClient {
    /// Start a client accepting every local name
    pub fn start() -> Self {
        Self::start_with(client_config(COOKIE), ChannelDelivery::new())
    }

    /// Start a client with a custom config and delivery sink
    pub fn start_with(
        config: DistConfig,
        (delivery, inbox): (ChannelDelivery, mpsc::UnboundedReceiver<LocalEvent>),
    ) -> Self {
        let (connector, peers) = MemoryConnector::new();
        let resolver = StaticResolver::new().with_node("server", "localhost", SERVER_PORT);
        let node = Node::start(
            config,
            Arc::new(connector.clone()),
            Arc::new(resolver),
            delivery,
        );
        let events = node.subscribe();
        Self {
            node,
            events,
            inbox,
            peers,
            connector,
        }
    }

    /// Next connection the node opens
    pub async fn accept(&mut self) -> ScriptedPeer {
        let peer = tokio::time::timeout(STEP, self.peers.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped");
        assert_eq!(peer.host, "localhost");
        assert_eq!(peer.port, SERVER_PORT);
        ScriptedPeer::new(peer.stream, COOKIE)
    }

    /// Next node event
    pub async fn next_event(&mut self) -> NodeEvent {
        tokio::time::timeout(STEP, self.events.recv())
            .await
            .expect("no node event")
            .expect("event channel closed")
    }

    /// Next local delivery
    pub async fn next_local(&mut self) -> LocalEvent {
        tokio::time::timeout(STEP, self.inbox.recv())
            .await
            .expect("no local event")
            .expect("delivery channel closed")
    }
}

/// Client configuration used by most tests
pub fn client_config(cookie: &str) -> DistConfig {
    DistConfig::new(
        CLIENT.parse().expect("valid node name"),
        Cookie::new(cookie).expect("valid cookie"),
    )
}

/// Server node id
pub fn server() -> NodeId {
    SERVER.parse().expect("valid node name")
}

/// A pid on the scripted peer
pub fn remote_pid(id: u32) -> Pid {
    Pid::new(SERVER, id, 0, 3)
}

/// What the client said in its name message
#[derive(Debug, Clone)]
pub struct ClientHello {
    /// Advertised flags
    pub flags: u64,
    /// Advertised version
    pub version: u32,
    /// Client node name
    pub name: String,
}

/// Accepting side of one connection
pub struct ScriptedPeer {
    stream: DuplexStream,
    cookie: Cookie,
    challenge: u32,
    flags: u64,
}

impl ScriptedPeer {
    /// Wrap the remote end of a pipe
    pub fn new(stream: DuplexStream, cookie: &str) -> Self {
        Self {
            stream,
            cookie: Cookie::new(cookie).expect("valid cookie"),
            challenge: 0x1234_5678,
            flags: PEER_FLAGS,
        }
    }

    /// Answer with a different cookie
    #[must_use]
    pub fn with_cookie(mut self, cookie: &str) -> Self {
        self.cookie = Cookie::new(cookie).expect("valid cookie");
        self
    }

    /// Advertise different flags
    #[must_use]
    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = flags;
        self
    }

    /// Read one u16-framed handshake message
    pub async fn read_handshake(&mut self) -> Vec<u8> {
        let len = self.stream.read_u16().await.expect("handshake length");
        let mut payload = vec![0u8; usize::from(len)];
        self.stream
            .read_exact(&mut payload)
            .await
            .expect("handshake payload");
        payload
    }

    /// Write one u16-framed handshake message
    pub async fn write_handshake(&mut self, payload: &[u8]) {
        let len = u16::try_from(payload.len()).expect("handshake payload fits u16");
        self.stream.write_u16(len).await.expect("write length");
        self.stream.write_all(payload).await.expect("write payload");
    }

    /// Read the client's name message and send `status`
    pub async fn read_name(&mut self, status: &[u8]) -> ClientHello {
        let msg = self.read_handshake().await;
        assert_eq!(msg[0], b'N', "name message tag");
        let flags = u64::from_be_bytes(msg[1..9].try_into().expect("flags"));
        let version = u32::from_be_bytes(msg[9..13].try_into().expect("version"));
        let nlen = usize::from(u16::from_be_bytes([msg[13], msg[14]]));
        let name = String::from_utf8(msg[15..15 + nlen].to_vec()).expect("utf8 name");
        self.write_handshake(status).await;
        ClientHello {
            flags,
            version,
            name,
        }
    }

    /// Send our challenge and read the client's reply.
    ///
    /// Returns the client's challenge and whether its digest matched our
    /// cookie.
    pub async fn challenge(&mut self) -> (u32, bool) {
        let mut msg = vec![b'N'];
        msg.extend_from_slice(&self.flags.to_be_bytes());
        msg.extend_from_slice(&self.challenge.to_be_bytes());
        msg.extend_from_slice(&3u32.to_be_bytes());
        msg.extend_from_slice(SERVER.as_bytes());
        self.write_handshake(&msg).await;

        let reply = self.read_handshake().await;
        assert_eq!(reply[0], b'r', "challenge reply tag");
        assert_eq!(reply.len(), 1 + 4 + 16);
        let client_challenge = u32::from_be_bytes(reply[1..5].try_into().expect("challenge"));
        let digest: Digest = reply[5..21].try_into().expect("digest");
        let ok = verify_digest(self.cookie.as_bytes(), self.challenge, &digest);
        (client_challenge, ok)
    }

    /// Send the challenge ack for `client_challenge`
    pub async fn ack(&mut self, client_challenge: u32) {
        let mut msg = vec![b'a'];
        msg.extend_from_slice(&gen_digest(self.cookie.as_bytes(), client_challenge));
        self.write_handshake(&msg).await;
    }

    /// Run the whole accepting handshake. Panics if the client's digest is
    /// wrong.
    pub async fn handshake(&mut self) -> ClientHello {
        let hello = self.read_name(b"sok").await;
        let (client_challenge, ok) = self.challenge().await;
        assert!(ok, "client digest did not match");
        self.ack(client_challenge).await;
        hello
    }

    /// Read the next live frame, skipping tick answers
    pub async fn read_frame(&mut self) -> Vec<u8> {
        loop {
            let len = self.stream.read_u32().await.expect("frame length");
            if len == 0 {
                continue;
            }
            let len = usize::try_from(len).expect("frame length fits usize");
            let mut payload = vec![0u8; len];
            self.stream
                .read_exact(&mut payload)
                .await
                .expect("frame payload");
            return payload;
        }
    }

    /// Read the next live control message
    pub async fn recv_control(&mut self) -> ControlMessage {
        let frame = tokio::time::timeout(STEP, self.read_frame())
            .await
            .expect("no control frame");
        ControlMessage::decode(&frame).expect("valid control frame")
    }

    /// Write a live control message
    pub async fn send_control(&mut self, msg: &ControlMessage) {
        let payload = msg.encode().expect("encodable control message");
        let len = u32::try_from(payload.len()).expect("frame fits u32");
        self.stream.write_u32(len).await.expect("write length");
        self.stream.write_all(&payload).await.expect("write payload");
    }

    /// Write raw bytes
    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write raw");
    }

    /// Read exactly `n` raw bytes
    pub async fn read_raw(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(STEP, self.stream.read_exact(&mut buf))
            .await
            .expect("no raw bytes")
            .expect("read raw");
        buf
    }

    /// Wait until the client closes its end
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(STEP, async {
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await;
        assert!(read.is_ok(), "client never closed the connection");
    }

    /// Drop our end of the pipe
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
