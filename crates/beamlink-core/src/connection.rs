//! Per-node connection state.
//!
//! A `Connection` composes the framer, handshake, request queue and link
//! registry for one peer. It is driven by transport events (`on_connected`,
//! `on_data`, `on_closed`) and by submitted operations, and answers each
//! with the effects to execute.

use crate::config::DistConfig;
use crate::control::ControlMessage;
use crate::effect::{Effect, Recipient};
use crate::error::{ConnectionError, HandshakeError};
use crate::flags::DistributionFlags;
use crate::framer::{Framer, HeaderWidth};
use crate::handshake::{Handshake, HandshakeState, HandshakeStep, PeerInfo};
use crate::links::LinkRegistry;
use crate::node_id::NodeId;
use crate::operation::Operation;
use crate::term;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Trace target for mirrored traffic
pub const WIRE_TARGET: &str = "beamlink::wire";

/// Exit reason synthesized for links severed by a disconnect
pub const NOCONNECTION: &str = "noconnection";

/// Identifies one transport lifetime of a connection.
///
/// A new id is allocated every time a node is (re)connected, so events from
/// a torn-down transport can be told apart from its successor's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// Connection to one peer node
#[derive(Debug)]
pub struct Connection {
    node: NodeId,
    id: ConnectionId,
    config: Arc<DistConfig>,
    handshake: Handshake,
    framer: Framer,
    buffer: BytesMut,
    pending: VecDeque<Operation>,
    links: LinkRegistry,
    alive: bool,
    shutting_down: bool,
    next_unlink_id: i32,
}

impl Connection {
    /// New connection awaiting its transport
    #[must_use]
    pub fn new(node: NodeId, id: ConnectionId, config: Arc<DistConfig>) -> Self {
        Self {
            node,
            id,
            handshake: Handshake::new(Arc::clone(&config)),
            framer: Framer::with_limit(config.max_frame_size),
            config,
            buffer: BytesMut::new(),
            pending: VecDeque::new(),
            links: LinkRegistry::new(),
            alive: false,
            shutting_down: false,
            next_unlink_id: 1,
        }
    }

    /// Peer node
    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Transport lifetime id
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the handshake completed and the connection is usable
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Whether the disconnect procedure has run
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Current handshake state
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// Current frame header width
    #[must_use]
    pub fn header_width(&self) -> HeaderWidth {
        self.framer.width()
    }

    /// Operations waiting for the handshake
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Links tracked on this connection
    #[must_use]
    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// What the peer sent in its challenge, once known
    #[must_use]
    pub fn peer(&self) -> Option<&PeerInfo> {
        self.handshake.peer()
    }

    /// Submit an outbound operation.
    ///
    /// Sent immediately when alive, queued before that, and discarded once
    /// the connection is shutting down. Links are tracked at submission.
    pub fn submit(&mut self, op: Operation) -> Vec<Effect> {
        if self.shutting_down {
            tracing::debug!(
                node = %self.node,
                kind = op.kind(),
                "Discarding operation for node that is going down"
            );
            return Vec::new();
        }

        match &op {
            Operation::Link { from, to } => {
                self.links.insert(from.clone(), to.clone());
            }
            Operation::Unlink { from, to } | Operation::Exit { from, to, .. } => {
                self.links.remove(from, to);
            }
            _ => {}
        }

        if self.alive {
            return self.transmit_operation(&op).into_iter().collect();
        }

        tracing::trace!(node = %self.node, kind = op.kind(), "Queueing operation until live");
        self.pending.push_back(op);
        Vec::new()
    }

    /// Transport is open: send the name message.
    pub fn on_connected(&mut self) -> Vec<Effect> {
        if self.shutting_down {
            return Vec::new();
        }
        tracing::debug!(node = %self.node, connection = %self.id, "Transport connected");

        match self.handshake.start() {
            Ok(name) => match self.transmit_payload(&name) {
                Some(effect) => vec![effect],
                None => self.fail(ConnectionError::ProtocolViolation(
                    "name message does not fit a frame".into(),
                )),
            },
            Err(e) => self.fail(ConnectionError::from_handshake(&e, &self.node.to_string())),
        }
    }

    /// Bytes arrived from the transport.
    ///
    /// Processes every complete frame in the buffer, echoing ticks before
    /// each data frame.
    pub fn on_data(&mut self, data: &[u8]) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.shutting_down {
            return effects;
        }
        self.buffer.extend_from_slice(data);

        loop {
            if self.alive {
                let ticks = self.framer.take_ticks(&mut self.buffer);
                for _ in 0..ticks {
                    tracing::trace!(node = %self.node, "Tick");
                    effects.push(self.transmit_raw(self.framer.tick()));
                }
            }

            if let Err(e) = self.framer.check_next(&self.buffer) {
                tracing::warn!(node = %self.node, error = %e, "Oversized frame");
                effects.extend(self.fail(ConnectionError::ProtocolViolation(e.to_string())));
                break;
            }

            let Some(frame) = self.framer.try_take_frame(&mut self.buffer) else {
                break;
            };
            self.trace_wire(Direction::In, &frame);

            if self.alive {
                self.dispatch(&frame, &mut effects);
            } else {
                self.advance_handshake(&frame, &mut effects);
            }

            if self.shutting_down {
                break;
            }
        }

        effects
    }

    /// Transport closed by the peer or the network.
    ///
    /// A close while waiting for the challenge ack is reported as an
    /// authentication failure: peers drop the connection on a bad digest.
    pub fn on_closed(&mut self) -> Vec<Effect> {
        let reason = if self.handshake.state() == HandshakeState::AwaitChallengeAck {
            ConnectionError::AuthenticationFailure {
                node: self.node.to_string(),
            }
        } else {
            ConnectionError::TransportClosed
        };
        self.disconnect(reason)
    }

    /// Handshake deadline passed.
    pub fn on_handshake_timeout(&mut self) -> Vec<Effect> {
        if self.handshake.is_finished() || self.shutting_down {
            return Vec::new();
        }
        self.fail(ConnectionError::HandshakeTimeout)
    }

    /// Tear the connection down locally and close the transport.
    pub fn fail(&mut self, reason: ConnectionError) -> Vec<Effect> {
        let mut effects = self.disconnect(reason);
        if !effects.is_empty() {
            effects.push(Effect::Close {
                node: self.node.clone(),
                connection: self.id,
            });
        }
        effects
    }

    /// Run the disconnect procedure once.
    ///
    /// Discards queued operations, synthesizes a `noconnection` exit for
    /// every tracked link and reports the node down. Later calls do nothing.
    pub fn disconnect(&mut self, reason: ConnectionError) -> Vec<Effect> {
        if self.shutting_down {
            return Vec::new();
        }
        self.shutting_down = true;
        self.alive = false;
        self.handshake.fail();
        self.buffer.clear();

        match &reason {
            ConnectionError::AuthenticationFailure { .. }
            | ConnectionError::ProtocolViolation(_)
            | ConnectionError::MalformedControlTuple(_)
            | ConnectionError::HandshakeTimeout => {
                tracing::warn!(node = %self.node, connection = %self.id, "{}", reason);
            }
            ConnectionError::TransportClosed => {}
        }

        if !self.pending.is_empty() {
            tracing::debug!(
                node = %self.node,
                discarded = self.pending.len(),
                "Discarding queued operations"
            );
            self.pending.clear();
        }

        let mut effects: Vec<Effect> = self
            .links
            .drain()
            .into_iter()
            .map(|link| Effect::Exit {
                to: link.local,
                from: link.remote,
                reason: term::atom(NOCONNECTION),
            })
            .collect();

        tracing::info!(node = %self.node, reason = %reason, "Node down");
        effects.push(Effect::NodeDown {
            node: self.node.clone(),
            reason,
        });
        effects
    }

    fn advance_handshake(&mut self, frame: &[u8], effects: &mut Vec<Effect>) {
        match self.handshake.on_frame(frame) {
            Ok(HandshakeStep::Continue) => {}
            Ok(HandshakeStep::Reply(reply)) => match self.transmit_payload(&reply) {
                Some(effect) => effects.push(effect),
                None => effects.extend(self.fail(ConnectionError::ProtocolViolation(
                    "challenge reply does not fit a frame".into(),
                ))),
            },
            Ok(HandshakeStep::Established(peer)) => self.go_live(peer, effects),
            Err(e) => effects.extend(self.handshake_failed(&e)),
        }
    }

    fn handshake_failed(&mut self, err: &HandshakeError) -> Vec<Effect> {
        self.fail(ConnectionError::from_handshake(err, &self.node.to_string()))
    }

    fn go_live(&mut self, peer: PeerInfo, effects: &mut Vec<Effect>) {
        self.alive = true;
        self.framer.upgrade();

        let queued: Vec<Operation> = self.pending.drain(..).collect();
        if !queued.is_empty() {
            tracing::debug!(node = %self.node, count = queued.len(), "Flushing queued operations");
        }
        for op in &queued {
            if let Some(effect) = self.transmit_operation(op) {
                effects.push(effect);
            }
        }

        tracing::info!(node = %self.node, peer = %peer.name, "Node up");
        effects.push(Effect::NodeUp {
            node: self.node.clone(),
            peer,
        });
    }

    fn dispatch(&mut self, frame: &[u8], effects: &mut Vec<Effect>) {
        let msg = match ControlMessage::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                effects.extend(self.fail(e.into()));
                return;
            }
        };
        tracing::trace!(node = %self.node, tag = msg.tag(), "Control message");

        match msg {
            ControlMessage::Link { from, to } => {
                self.links.insert(to.clone(), from.clone());
                effects.push(Effect::AddLink {
                    local: to,
                    remote: from,
                });
            }
            ControlMessage::Send { to, message } => {
                effects.push(Effect::Deliver {
                    to: Recipient::Pid(to),
                    message,
                });
            }
            ControlMessage::Exit { from, to, reason } => {
                self.links.remove(&to, &from);
                effects.push(Effect::Exit { to, from, reason });
            }
            ControlMessage::Exit2 { from, to, reason } => {
                effects.push(Effect::Exit { to, from, reason });
            }
            ControlMessage::Unlink { from, to } => {
                self.links.remove(&to, &from);
                effects.push(Effect::RemoveLink {
                    local: to,
                    remote: from,
                });
            }
            ControlMessage::RegSend { name, message, .. } => {
                effects.push(Effect::Deliver {
                    to: Recipient::Name(name),
                    message,
                });
            }
            ControlMessage::UnlinkId { id, from, to } => {
                self.links.remove(&to, &from);
                let ack = ControlMessage::UnlinkIdAck {
                    id,
                    from: to.clone(),
                    to: from.clone(),
                };
                if let Some(effect) = self.transmit_control(&ack) {
                    effects.push(effect);
                }
                effects.push(Effect::RemoveLink {
                    local: to,
                    remote: from,
                });
            }
            ControlMessage::UnlinkIdAck { id, .. } => {
                tracing::trace!(node = %self.node, id = ?id, "Unlink acknowledged");
            }
        }
    }

    fn unlink_id_for(&mut self, op: &Operation) -> Option<i32> {
        let peer_flags = self.handshake.peer().map(|p| p.flags)?;
        if !matches!(op, Operation::Unlink { .. })
            || !peer_flags.contains(DistributionFlags::UNLINK_ID)
        {
            return None;
        }
        let id = self.next_unlink_id;
        self.next_unlink_id = self.next_unlink_id.checked_add(1).unwrap_or(1);
        Some(id)
    }

    fn transmit_operation(&mut self, op: &Operation) -> Option<Effect> {
        let unlink_id = self.unlink_id_for(op);
        match op.encode(unlink_id) {
            Ok(payload) => self.transmit_payload(&payload),
            Err(e) => {
                tracing::warn!(node = %self.node, kind = op.kind(), "Dropping unencodable operation: {}", e);
                None
            }
        }
    }

    fn transmit_control(&self, msg: &ControlMessage) -> Option<Effect> {
        match msg.encode() {
            Ok(payload) => self.transmit_payload(&payload),
            Err(e) => {
                tracing::warn!(node = %self.node, tag = msg.tag(), "Dropping unencodable control message: {}", e);
                None
            }
        }
    }

    fn transmit_payload(&self, payload: &[u8]) -> Option<Effect> {
        match self.framer.frame(payload) {
            Ok(bytes) => {
                self.trace_wire(Direction::Out, payload);
                Some(self.transmit_raw(bytes))
            }
            Err(e) => {
                tracing::warn!(node = %self.node, "Dropping frame: {}", e);
                None
            }
        }
    }

    fn transmit_raw(&self, bytes: bytes::Bytes) -> Effect {
        Effect::Transmit {
            node: self.node.clone(),
            connection: self.id,
            bytes,
        }
    }

    fn trace_wire(&self, direction: Direction, payload: &[u8]) {
        if !self.config.trace_traffic {
            return;
        }
        let direction = match direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        tracing::trace!(
            target: WIRE_TARGET,
            node = %self.node,
            direction,
            len = payload.len(),
            "{}",
            hex::encode(payload)
        );
    }
}
