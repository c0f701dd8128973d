//! Outbound operations.

use crate::control::ControlMessage;
use crate::error::TermError;
use crate::term;
use eetf::{Atom, Pid, Term};

/// A caller-issued request bound for one peer node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Send `message` to a remote pid
    Send {
        /// Recipient
        to: Pid,
        /// Message term
        message: Term,
    },
    /// Send `message` to a name registered on the peer
    RegSend {
        /// Local sender
        from: Pid,
        /// Registered name on the peer
        to_name: Atom,
        /// Message term
        message: Term,
    },
    /// Link a local process to a remote one
    Link {
        /// Local process
        from: Pid,
        /// Remote process
        to: Pid,
    },
    /// Remove a link
    Unlink {
        /// Local process
        from: Pid,
        /// Remote process
        to: Pid,
    },
    /// Exit signal over a link
    Exit {
        /// Local exiting process
        from: Pid,
        /// Remote linked process
        to: Pid,
        /// Exit reason
        reason: Term,
    },
    /// `exit/2` signal
    Exit2 {
        /// Local signalling process
        from: Pid,
        /// Remote target
        to: Pid,
        /// Exit reason
        reason: Term,
    },
}

impl Operation {
    /// Short name for logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::RegSend { .. } => "reg_send",
            Self::Link { .. } => "link",
            Self::Unlink { .. } => "unlink",
            Self::Exit { .. } => "exit",
            Self::Exit2 { .. } => "exit2",
        }
    }

    /// Control message for this operation.
    ///
    /// `unlink_id` selects the identified unlink form; it is ignored by
    /// every other operation.
    #[must_use]
    pub fn to_control(&self, unlink_id: Option<i32>) -> ControlMessage {
        match self.clone() {
            Self::Send { to, message } => ControlMessage::Send { to, message },
            Self::RegSend {
                from,
                to_name,
                message,
            } => ControlMessage::RegSend {
                from,
                name: to_name,
                message,
            },
            Self::Link { from, to } => ControlMessage::Link { from, to },
            Self::Unlink { from, to } => match unlink_id {
                Some(id) => ControlMessage::UnlinkId {
                    id: term::int(id),
                    from,
                    to,
                },
                None => ControlMessage::Unlink { from, to },
            },
            Self::Exit { from, to, reason } => ControlMessage::Exit { from, to, reason },
            Self::Exit2 { from, to, reason } => ControlMessage::Exit2 { from, to, reason },
        }
    }

    /// Serialize as a live frame payload.
    ///
    /// # Errors
    ///
    /// Returns `TermError` if a term cannot be encoded.
    pub fn encode(&self, unlink_id: Option<i32>) -> Result<Vec<u8>, TermError> {
        self.to_control(unlink_id).encode()
    }
}
