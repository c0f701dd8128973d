//! Async runtime driving the connection manager.
//!
//! One task owns the `ConnectionManager` and the `LocalDelivery` sink. API
//! calls and transport events reach it over a single channel; per-connection
//! tasks only move bytes between the stream and that channel.

use super::delivery::LocalDelivery;
use super::error::{NodeError, Result};
use crate::config::DistConfig;
use crate::connection::ConnectionId;
use crate::effect::Effect;
use crate::error::ConnectionError;
use crate::handshake::PeerInfo;
use crate::manager::ConnectionManager;
use crate::node_id::NodeId;
use beamlink_transport::{Connector, DistStream, PortResolver};
use bytes::Bytes;
use eetf::{Atom, Pid, Reference, Term};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Capacity of the node event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long shutdown waits for connections to flush their writes
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Connection lifecycle notification
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Handshake with `node` completed
    Up {
        /// Peer node
        node: NodeId,
        /// What the peer sent in its challenge
        peer: PeerInfo,
    },
    /// Connection to `node` was torn down
    Down {
        /// Peer node
        node: NodeId,
        /// Why
        reason: ConnectionError,
    },
}

/// Caller requests
#[derive(Debug)]
enum Command {
    Send {
        to: Pid,
        message: Term,
    },
    RegSend {
        node: NodeId,
        from: Pid,
        name: Atom,
        message: Term,
    },
    Link {
        from: Pid,
        to: Pid,
    },
    Unlink {
        from: Pid,
        to: Pid,
    },
    Exit {
        from: Pid,
        to: Pid,
        reason: Term,
    },
    Exit2 {
        from: Pid,
        to: Pid,
        reason: Term,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Events from connection tasks and timers
#[derive(Debug)]
enum TransportEvent {
    Connected { node: NodeId, id: ConnectionId },
    Data { node: NodeId, id: ConnectionId, bytes: Bytes },
    Closed { node: NodeId, id: ConnectionId },
    HandshakeTimeout { node: NodeId, id: ConnectionId },
}

#[derive(Debug)]
enum Input {
    Command(Command),
    Transport(TransportEvent),
}

/// Handle to a running local node.
///
/// Cheap to clone; every clone talks to the same runtime task.
#[derive(Debug, Clone)]
pub struct Node {
    config: Arc<DistConfig>,
    inbox: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<NodeEvent>,
    counters: Arc<Counters>,
}

#[derive(Debug)]
struct Counters {
    pid: AtomicU32,
    reference: AtomicU32,
}

impl Node {
    /// Spawn the runtime task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<D: LocalDelivery>(
        config: DistConfig,
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn PortResolver>,
        delivery: D,
    ) -> Self {
        let manager = ConnectionManager::new(config);
        let config = Arc::clone(manager.config());
        let (inbox, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let runtime = Runtime {
            manager,
            connector,
            resolver,
            delivery,
            events: events.clone(),
            inbox: inbox.downgrade(),
            connections: HashMap::new(),
            closing: Vec::new(),
        };
        tokio::spawn(runtime.run(rx));

        tracing::info!(node = %config.node_name, "Node started");
        Self {
            config,
            inbox,
            events,
            counters: Arc::new(Counters {
                pid: AtomicU32::new(1),
                reference: AtomicU32::new(1),
            }),
        }
    }

    /// Local node name
    #[must_use]
    pub fn name(&self) -> &NodeId {
        &self.config.node_name
    }

    /// Node configuration
    #[must_use]
    pub fn config(&self) -> &DistConfig {
        &self.config
    }

    /// Observe node-up / node-down events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Allocate a fresh local pid
    #[must_use]
    pub fn make_pid(&self) -> Pid {
        let id = self.counters.pid.fetch_add(1, Ordering::Relaxed);
        Pid::new(
            self.config.node_name.to_string(),
            id,
            0,
            self.config.creation(),
        )
    }

    /// Allocate a fresh local reference
    #[must_use]
    pub fn make_ref(&self) -> Reference {
        let id = self.counters.reference.fetch_add(1, Ordering::Relaxed);
        Reference {
            node: self.config.node_name.to_atom(),
            id: vec![id, 0, 0],
            creation: self.config.creation(),
        }
    }

    /// Send `message` to a remote pid.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidNodeId` for a malformed pid node and
    /// `NodeError::RuntimeStopped` after shutdown.
    pub fn send(&self, to: Pid, message: Term) -> Result<()> {
        NodeId::of_pid(&to)?;
        self.command(Command::Send { to, message })
    }

    /// Send `message` to `name` registered on `node`.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::RuntimeStopped` after shutdown.
    pub fn reg_send(&self, node: NodeId, from: Pid, name: Atom, message: Term) -> Result<()> {
        self.command(Command::RegSend {
            node,
            from,
            name,
            message,
        })
    }

    /// Link local `from` to remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidNodeId` for a malformed pid node and
    /// `NodeError::RuntimeStopped` after shutdown.
    pub fn link(&self, from: Pid, to: Pid) -> Result<()> {
        NodeId::of_pid(&to)?;
        self.command(Command::Link { from, to })
    }

    /// Remove the link between local `from` and remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidNodeId` for a malformed pid node and
    /// `NodeError::RuntimeStopped` after shutdown.
    pub fn unlink(&self, from: Pid, to: Pid) -> Result<()> {
        NodeId::of_pid(&to)?;
        self.command(Command::Unlink { from, to })
    }

    /// Propagate local `from`'s exit to linked remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidNodeId` for a malformed pid node and
    /// `NodeError::RuntimeStopped` after shutdown.
    pub fn exit(&self, from: Pid, to: Pid, reason: Term) -> Result<()> {
        NodeId::of_pid(&to)?;
        self.command(Command::Exit { from, to, reason })
    }

    /// Send an `exit/2` signal from local `from` to remote `to`.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidNodeId` for a malformed pid node and
    /// `NodeError::RuntimeStopped` after shutdown.
    pub fn exit2(&self, from: Pid, to: Pid, reason: Term) -> Result<()> {
        NodeId::of_pid(&to)?;
        self.command(Command::Exit2 { from, to, reason })
    }

    /// Close every connection and stop the runtime task.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::RuntimeStopped` if it had already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.command(Command::Shutdown { done })?;
        wait.await.map_err(|_| NodeError::RuntimeStopped)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.inbox
            .send(Input::Command(command))
            .map_err(|_| NodeError::RuntimeStopped)
    }
}

struct ConnectionTask {
    writer: mpsc::UnboundedSender<Bytes>,
    handle: JoinHandle<()>,
}

struct Runtime<D> {
    manager: ConnectionManager,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn PortResolver>,
    delivery: D,
    events: broadcast::Sender<NodeEvent>,
    inbox: mpsc::WeakUnboundedSender<Input>,
    connections: HashMap<ConnectionId, ConnectionTask>,
    closing: Vec<JoinHandle<()>>,
}

impl<D: LocalDelivery> Runtime<D> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = rx.recv().await {
            let effects = match input {
                Input::Command(Command::Shutdown { done }) => {
                    let effects = self.manager.shutdown();
                    self.execute(effects);
                    self.drain().await;
                    rx.close();
                    let _ = done.send(());
                    break;
                }
                Input::Command(command) => self.handle_command(command),
                Input::Transport(event) => self.handle_transport(event),
            };
            self.execute(effects);
        }

        self.drain().await;
        tracing::info!(node = %self.manager.config().node_name, "Node stopped");
    }

    fn handle_command(&mut self, command: Command) -> Vec<Effect> {
        let result = match command {
            Command::Send { to, message } => self.manager.send(to, message),
            Command::RegSend {
                node,
                from,
                name,
                message,
            } => Ok(self.manager.reg_send(node, from, name, message)),
            Command::Link { from, to } => self.manager.link(from, to),
            Command::Unlink { from, to } => self.manager.unlink(from, to),
            Command::Exit { from, to, reason } => self.manager.exit(from, to, reason),
            Command::Exit2 { from, to, reason } => self.manager.exit2(from, to, reason),
            Command::Shutdown { .. } => Ok(Vec::new()),
        };
        result.unwrap_or_else(|e| {
            tracing::debug!("Rejected operation: {}", e);
            Vec::new()
        })
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Connected { node, id } => self.manager.on_connected(&node, id),
            TransportEvent::Data { node, id, bytes } => self.manager.on_data(&node, id, &bytes),
            TransportEvent::Closed { node, id } => {
                self.connections.remove(&id);
                self.manager.on_closed(&node, id)
            }
            TransportEvent::HandshakeTimeout { node, id } => {
                self.manager.on_handshake_timeout(&node, id)
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Connect { node, connection } => self.spawn_connection(node, connection),
                Effect::Transmit {
                    connection, bytes, ..
                } => {
                    let sent = self
                        .connections
                        .get(&connection)
                        .is_some_and(|task| task.writer.send(bytes).is_ok());
                    if !sent {
                        tracing::debug!(connection = %connection, "Dropping write for closed connection");
                    }
                }
                Effect::Close { node, connection } => {
                    tracing::debug!(node = %node, connection = %connection, "Closing transport");
                    self.close(connection);
                }
                Effect::Deliver { to, message } => {
                    if let Err(e) = self.delivery.deliver(&to, message) {
                        tracing::debug!(recipient = ?to, "Dropped delivery: {}", e);
                    }
                }
                Effect::Exit { to, from, reason } => self.delivery.notify_exit(&to, &from, reason),
                Effect::AddLink { local, remote } => self.delivery.add_link(&local, &remote),
                Effect::RemoveLink { local, remote } => self.delivery.remove_link(&local, &remote),
                Effect::NodeUp { node, peer } => {
                    let _ = self.events.send(NodeEvent::Up { node, peer });
                }
                Effect::NodeDown { node, reason } => {
                    let _ = self.events.send(NodeEvent::Down { node, reason });
                }
            }
        }
    }

    /// Drop the writer so the task flushes queued bytes and exits.
    fn close(&mut self, connection: ConnectionId) {
        self.closing.retain(|handle| !handle.is_finished());
        if let Some(task) = self.connections.remove(&connection) {
            self.closing.push(task.handle);
        }
    }

    fn spawn_connection(&mut self, node: NodeId, id: ConnectionId) {
        let Some(inbox) = self.inbox.upgrade() else {
            return;
        };
        let config = self.manager.config();

        if let Some(timeout) = config.handshake_timeout {
            let inbox = inbox.clone();
            let node = node.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = inbox.send(Input::Transport(TransportEvent::HandshakeTimeout { node, id }));
            });
        }

        let (writer, writes) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_connection(
            node,
            id,
            Arc::clone(&self.connector),
            Arc::clone(&self.resolver),
            inbox,
            writes,
            config.read_buffer_size,
        ));
        self.connections
            .insert(id, ConnectionTask { writer, handle });
    }

    async fn drain(&mut self) {
        let mut handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.closing);
        handles.extend(self.connections.drain().map(|(_, task)| task.handle));

        let wait = async {
            for handle in &mut handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, wait).await.is_err() {
            tracing::debug!("Aborting connections that did not close in time");
            for handle in &handles {
                handle.abort();
            }
        }
    }
}

async fn open(
    node: &NodeId,
    connector: &dyn Connector,
    resolver: &dyn PortResolver,
) -> Result<Box<dyn DistStream>> {
    let port = resolver.resolve_port(node.name(), node.host()).await?;
    tracing::debug!(node = %node, port, "Resolved node port");
    Ok(connector.connect(node.host(), port).await?)
}

async fn run_connection(
    node: NodeId,
    id: ConnectionId,
    connector: Arc<dyn Connector>,
    resolver: Arc<dyn PortResolver>,
    inbox: mpsc::UnboundedSender<Input>,
    mut writes: mpsc::UnboundedReceiver<Bytes>,
    read_buffer_size: usize,
) {
    let emit = |event| inbox.send(Input::Transport(event)).is_ok();

    let stream = match open(&node, connector.as_ref(), resolver.as_ref()).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(node = %node, "Connect failed: {}", e);
            emit(TransportEvent::Closed { node, id });
            return;
        }
    };
    if !emit(TransportEvent::Connected {
        node: node.clone(),
        id,
    }) {
        return;
    }

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = vec![0u8; read_buffer_size.max(1)];
    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    let data = TransportEvent::Data {
                        node: node.clone(),
                        id,
                        bytes: Bytes::copy_from_slice(&buf[..n]),
                    };
                    if !emit(data) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(node = %node, "Read failed: {}", e);
                    break;
                }
            },
            out = writes.recv() => match out {
                Some(bytes) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        tracing::debug!(node = %node, "Write failed: {}", e);
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!(node = %node, connection = %id, "Transport closed");
    emit(TransportEvent::Closed { node, id });
}

/// Wait up to `timeout` for a node event accepted by `matches`.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<NodeEvent>,
    timeout: Duration,
    mut matches: F,
) -> Option<NodeEvent>
where
    F: FnMut(&NodeEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}
