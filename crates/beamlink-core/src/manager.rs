//! Connection manager.
//!
//! Owns one `Connection` per peer node, routes operations to it (creating
//! it on first use) and forwards transport events tagged with the
//! `ConnectionId` they belong to.

use crate::config::DistConfig;
use crate::connection::{Connection, ConnectionId};
use crate::effect::Effect;
use crate::error::{ConnectionError, NodeIdError};
use crate::node_id::NodeId;
use crate::operation::Operation;
use eetf::{Atom, Pid, Term};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-node connection registry
#[derive(Debug)]
pub struct ConnectionManager {
    config: Arc<DistConfig>,
    connections: HashMap<NodeId, Connection>,
    next_id: u64,
}

impl ConnectionManager {
    /// Create a manager with no connections
    #[must_use]
    pub fn new(config: DistConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Shared configuration
    #[must_use]
    pub fn config(&self) -> &Arc<DistConfig> {
        &self.config
    }

    /// Connection to `node`, if one exists
    #[must_use]
    pub fn connection(&self, node: &NodeId) -> Option<&Connection> {
        self.connections.get(node)
    }

    /// Nodes with an authenticated connection
    #[must_use]
    pub fn live_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .connections
            .values()
            .filter(|c| c.is_alive())
            .map(|c| c.node().clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Number of tracked connections, live or not
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Route an operation to `node`, connecting first if needed.
    pub fn submit(&mut self, node: NodeId, op: Operation) -> Vec<Effect> {
        if let Some(conn) = self.connections.get_mut(&node) {
            return conn.submit(op);
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        tracing::debug!(node = %node, connection = %id, "Opening connection");

        let mut conn = Connection::new(node.clone(), id, Arc::clone(&self.config));
        let mut effects = vec![Effect::Connect {
            node: node.clone(),
            connection: id,
        }];
        effects.extend(conn.submit(op));
        self.connections.insert(node, conn);
        effects
    }

    /// Send `message` to a remote pid.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if the pid's node is not `name@host`.
    pub fn send(&mut self, to: Pid, message: Term) -> Result<Vec<Effect>, NodeIdError> {
        let node = NodeId::of_pid(&to)?;
        Ok(self.submit(node, Operation::Send { to, message }))
    }

    /// Send `message` to `to_name` registered on `node`.
    pub fn reg_send(
        &mut self,
        node: NodeId,
        from: Pid,
        to_name: Atom,
        message: Term,
    ) -> Vec<Effect> {
        self.submit(
            node,
            Operation::RegSend {
                from,
                to_name,
                message,
            },
        )
    }

    /// Link local `from` to remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if `to`'s node is not `name@host`.
    pub fn link(&mut self, from: Pid, to: Pid) -> Result<Vec<Effect>, NodeIdError> {
        let node = NodeId::of_pid(&to)?;
        Ok(self.submit(node, Operation::Link { from, to }))
    }

    /// Remove the link between local `from` and remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if `to`'s node is not `name@host`.
    pub fn unlink(&mut self, from: Pid, to: Pid) -> Result<Vec<Effect>, NodeIdError> {
        let node = NodeId::of_pid(&to)?;
        Ok(self.submit(node, Operation::Unlink { from, to }))
    }

    /// Propagate local `from`'s exit to linked remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if `to`'s node is not `name@host`.
    pub fn exit(&mut self, from: Pid, to: Pid, reason: Term) -> Result<Vec<Effect>, NodeIdError> {
        let node = NodeId::of_pid(&to)?;
        Ok(self.submit(node, Operation::Exit { from, to, reason }))
    }

    /// Send an `exit/2` signal from local `from` to remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if `to`'s node is not `name@host`.
    pub fn exit2(&mut self, from: Pid, to: Pid, reason: Term) -> Result<Vec<Effect>, NodeIdError> {
        let node = NodeId::of_pid(&to)?;
        Ok(self.submit(node, Operation::Exit2 { from, to, reason }))
    }

    /// Transport for `id` is open
    pub fn on_connected(&mut self, node: &NodeId, id: ConnectionId) -> Vec<Effect> {
        match self.current(node, id) {
            Some(conn) => conn.on_connected(),
            None => Vec::new(),
        }
    }

    /// Bytes arrived on `id`
    pub fn on_data(&mut self, node: &NodeId, id: ConnectionId, data: &[u8]) -> Vec<Effect> {
        match self.current(node, id) {
            Some(conn) => conn.on_data(data),
            None => Vec::new(),
        }
    }

    /// Transport for `id` closed or failed to open. Forgets the connection.
    pub fn on_closed(&mut self, node: &NodeId, id: ConnectionId) -> Vec<Effect> {
        if self.current(node, id).is_none() {
            return Vec::new();
        }
        match self.connections.remove(node) {
            Some(mut conn) => conn.on_closed(),
            None => Vec::new(),
        }
    }

    /// Handshake deadline for `id` passed
    pub fn on_handshake_timeout(&mut self, node: &NodeId, id: ConnectionId) -> Vec<Effect> {
        match self.current(node, id) {
            Some(conn) => conn.on_handshake_timeout(),
            None => Vec::new(),
        }
    }

    /// Tear down every connection
    pub fn shutdown(&mut self) -> Vec<Effect> {
        let mut nodes: Vec<NodeId> = self.connections.keys().cloned().collect();
        nodes.sort();
        let mut effects = Vec::new();
        for node in nodes {
            if let Some(mut conn) = self.connections.remove(&node) {
                effects.extend(conn.fail(ConnectionError::TransportClosed));
            }
        }
        effects
    }

    fn current(&mut self, node: &NodeId, id: ConnectionId) -> Option<&mut Connection> {
        let conn = self.connections.get_mut(node)?;
        if conn.id() != id {
            tracing::debug!(node = %node, stale = %id, current = %conn.id(), "Ignoring event for stale connection");
            return None;
        }
        Some(conn)
    }
}
