//! Local delivery sink.
//!
//! The runtime hands inbound messages, exit signals and link changes to a
//! `LocalDelivery` implementation. The process registry behind it is owned
//! by the embedding application.

use crate::effect::Recipient;
use eetf::{Pid, Term};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::mpsc;

/// Why a message could not be delivered
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No local process is registered under the name
    #[error("no process registered as {0}")]
    UnknownName(String),

    /// The receiving side has gone away
    #[error("local receiver closed")]
    Closed,
}

/// Sink for everything the peer asks of local processes.
pub trait LocalDelivery: Send + 'static {
    /// Deliver a message to a local pid or registered name.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the recipient does not exist. The runtime
    /// logs and drops such messages.
    fn deliver(&mut self, to: &Recipient, message: Term) -> Result<(), DeliveryError>;

    /// Local process `to` received an exit signal from `from`.
    fn notify_exit(&mut self, to: &Pid, from: &Pid, reason: Term);

    /// Remote `remote` linked to local `local`.
    fn add_link(&mut self, local: &Pid, remote: &Pid);

    /// Remote `remote` unlinked from local `local`.
    fn remove_link(&mut self, local: &Pid, remote: &Pid);
}

/// Event forwarded by `ChannelDelivery`
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    /// Message for a local process or name
    Message {
        /// Recipient
        to: Recipient,
        /// Message term
        message: Term,
    },
    /// Exit signal
    Exit {
        /// Local process
        to: Pid,
        /// Signalling process
        from: Pid,
        /// Exit reason
        reason: Term,
    },
    /// Link established by the peer
    Linked {
        /// Local process
        local: Pid,
        /// Remote process
        remote: Pid,
    },
    /// Link removed by the peer
    Unlinked {
        /// Local process
        local: Pid,
        /// Remote process
        remote: Pid,
    },
}

/// Forwards every delivery to an unbounded channel.
///
/// With a name set, messages for other names are rejected as unknown.
#[derive(Debug, Clone)]
pub struct ChannelDelivery {
    tx: mpsc::UnboundedSender<LocalEvent>,
    names: Option<HashSet<String>>,
}

impl ChannelDelivery {
    /// Accept every pid and every name
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LocalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, names: None }, rx)
    }

    /// Accept every pid but only the given names
    #[must_use]
    pub fn with_names<I, S>(names: I) -> (Self, mpsc::UnboundedReceiver<LocalEvent>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (mut delivery, rx) = Self::new();
        delivery.names = Some(names.into_iter().map(Into::into).collect());
        (delivery, rx)
    }

    fn forward(&self, event: LocalEvent) -> Result<(), DeliveryError> {
        self.tx.send(event).map_err(|_| DeliveryError::Closed)
    }
}

impl LocalDelivery for ChannelDelivery {
    fn deliver(&mut self, to: &Recipient, message: Term) -> Result<(), DeliveryError> {
        if let (Recipient::Name(name), Some(names)) = (to, &self.names) {
            if !names.contains(&name.name) {
                return Err(DeliveryError::UnknownName(name.name.clone()));
            }
        }
        self.forward(LocalEvent::Message {
            to: to.clone(),
            message,
        })
    }

    fn notify_exit(&mut self, to: &Pid, from: &Pid, reason: Term) {
        let _ = self.forward(LocalEvent::Exit {
            to: to.clone(),
            from: from.clone(),
            reason,
        });
    }

    fn add_link(&mut self, local: &Pid, remote: &Pid) {
        let _ = self.forward(LocalEvent::Linked {
            local: local.clone(),
            remote: remote.clone(),
        });
    }

    fn remove_link(&mut self, local: &Pid, remote: &Pid) {
        let _ = self.forward(LocalEvent::Unlinked {
            local: local.clone(),
            remote: remote.clone(),
        });
    }
}
