//! Control messages carried by live-phase frames.
//!
//! A live frame is `'p' | control-term | [payload-term]`. The control term is
//! a tuple whose first element is the operation tag.

use crate::PASS_THROUGH;
use crate::error::{ControlError, TermError};
use crate::term::{self, as_atom, as_int, as_pid, as_tuple};
use eetf::{Atom, Pid, Term};

/// `{1, From, To}`
pub const TAG_LINK: i32 = 1;
/// `{2, Unused, To}` + message
pub const TAG_SEND: i32 = 2;
/// `{3, From, To, Reason}`
pub const TAG_EXIT: i32 = 3;
/// `{4, From, To}`
pub const TAG_UNLINK: i32 = 4;
/// `{6, From, Unused, ToName}` + message
pub const TAG_REG_SEND: i32 = 6;
/// `{8, From, To, Reason}`
pub const TAG_EXIT2: i32 = 8;
/// `{35, Id, From, To}`
pub const TAG_UNLINK_ID: i32 = 35;
/// `{36, Id, From, To}`
pub const TAG_UNLINK_ID_ACK: i32 = 36;

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// `from` linked itself to `to`
    Link {
        /// Linking process
        from: Pid,
        /// Linked process
        to: Pid,
    },
    /// Message to a process
    Send {
        /// Recipient
        to: Pid,
        /// Message term
        message: Term,
    },
    /// Exit signal propagated over a link
    Exit {
        /// Exiting process
        from: Pid,
        /// Linked process
        to: Pid,
        /// Exit reason
        reason: Term,
    },
    /// `from` removed its link to `to`
    Unlink {
        /// Unlinking process
        from: Pid,
        /// Unlinked process
        to: Pid,
    },
    /// Message to a registered name
    RegSend {
        /// Sender
        from: Pid,
        /// Registered name
        name: Atom,
        /// Message term
        message: Term,
    },
    /// `exit/2` signal
    Exit2 {
        /// Signalling process
        from: Pid,
        /// Target process
        to: Pid,
        /// Exit reason
        reason: Term,
    },
    /// Unlink carrying an identifier the receiver must acknowledge
    UnlinkId {
        /// Unlink identifier (integer term)
        id: Term,
        /// Unlinking process
        from: Pid,
        /// Unlinked process
        to: Pid,
    },
    /// Acknowledgement of an `UnlinkId`
    UnlinkIdAck {
        /// Identifier being acknowledged
        id: Term,
        /// Acknowledging process
        from: Pid,
        /// Process that sent the unlink
        to: Pid,
    },
}

impl ControlMessage {
    /// Operation tag
    #[must_use]
    pub fn tag(&self) -> i32 {
        match self {
            Self::Link { .. } => TAG_LINK,
            Self::Send { .. } => TAG_SEND,
            Self::Exit { .. } => TAG_EXIT,
            Self::Unlink { .. } => TAG_UNLINK,
            Self::RegSend { .. } => TAG_REG_SEND,
            Self::Exit2 { .. } => TAG_EXIT2,
            Self::UnlinkId { .. } => TAG_UNLINK_ID,
            Self::UnlinkIdAck { .. } => TAG_UNLINK_ID_ACK,
        }
    }

    /// Decode a live frame payload.
    ///
    /// # Errors
    ///
    /// Returns `ControlError` if the marker is missing, a term does not
    /// decode, the tag is unknown, or the tuple has the wrong shape.
    pub fn decode(frame: &[u8]) -> Result<Self, ControlError> {
        let (&marker, rest) = frame
            .split_first()
            .ok_or_else(|| ControlError::Malformed("empty frame".into()))?;
        if marker != PASS_THROUGH {
            return Err(ControlError::MissingMarker(marker));
        }

        let (control, used) =
            term::decode_term(rest).map_err(|e| ControlError::Term(e.to_string()))?;
        let rest = &rest[used..];
        let payload = if rest.is_empty() {
            None
        } else {
            let (payload, _) =
                term::decode_term(rest).map_err(|e| ControlError::Term(e.to_string()))?;
            Some(payload)
        };

        let fields = as_tuple(&control)
            .ok_or_else(|| ControlError::Malformed(format!("not a tuple: {control}")))?;
        let tag = fields
            .first()
            .and_then(as_int)
            .ok_or_else(|| ControlError::Malformed(format!("no integer tag: {control}")))?;

        match tag {
            TAG_LINK => {
                let [_, from, to] = arity::<3>(fields, tag)?;
                Ok(Self::Link {
                    from: pid(from, "from")?,
                    to: pid(to, "to")?,
                })
            }
            TAG_SEND => {
                let [_, _unused, to] = arity::<3>(fields, tag)?;
                Ok(Self::Send {
                    to: pid(to, "to")?,
                    message: payload.ok_or(ControlError::MissingPayload(tag))?,
                })
            }
            TAG_EXIT | TAG_EXIT2 => {
                let [_, from, to, reason] = arity::<4>(fields, tag)?;
                let from = pid(from, "from")?;
                let to = pid(to, "to")?;
                let reason = reason.clone();
                if tag == TAG_EXIT {
                    Ok(Self::Exit { from, to, reason })
                } else {
                    Ok(Self::Exit2 { from, to, reason })
                }
            }
            TAG_UNLINK => {
                let [_, from, to] = arity::<3>(fields, tag)?;
                Ok(Self::Unlink {
                    from: pid(from, "from")?,
                    to: pid(to, "to")?,
                })
            }
            TAG_REG_SEND => {
                let [_, from, _unused, name] = arity::<4>(fields, tag)?;
                let name = as_atom(name)
                    .ok_or_else(|| ControlError::Malformed(format!("name is not an atom: {name}")))?
                    .clone();
                Ok(Self::RegSend {
                    from: pid(from, "from")?,
                    name,
                    message: payload.ok_or(ControlError::MissingPayload(tag))?,
                })
            }
            TAG_UNLINK_ID | TAG_UNLINK_ID_ACK => {
                let [_, id, from, to] = arity::<4>(fields, tag)?;
                let id = id.clone();
                let from = pid(from, "from")?;
                let to = pid(to, "to")?;
                if tag == TAG_UNLINK_ID {
                    Ok(Self::UnlinkId { id, from, to })
                } else {
                    Ok(Self::UnlinkIdAck { id, from, to })
                }
            }
            other => Err(ControlError::UnknownTag(other)),
        }
    }

    /// Encode as a live frame payload (marker, control term, optional payload).
    ///
    /// # Errors
    ///
    /// Returns `TermError` if a term cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>, TermError> {
        let tag = term::int(self.tag());
        let unused = || term::atom("");
        let (control, payload) = match self {
            Self::Link { from, to } | Self::Unlink { from, to } => (
                term::tuple(vec![tag, Term::from(from.clone()), Term::from(to.clone())]),
                None,
            ),
            Self::Send { to, message } => (
                term::tuple(vec![tag, unused(), Term::from(to.clone())]),
                Some(message),
            ),
            Self::Exit { from, to, reason } | Self::Exit2 { from, to, reason } => (
                term::tuple(vec![
                    tag,
                    Term::from(from.clone()),
                    Term::from(to.clone()),
                    reason.clone(),
                ]),
                None,
            ),
            Self::RegSend {
                from,
                name,
                message,
            } => (
                term::tuple(vec![
                    tag,
                    Term::from(from.clone()),
                    unused(),
                    Term::from(name.clone()),
                ]),
                Some(message),
            ),
            Self::UnlinkId { id, from, to } | Self::UnlinkIdAck { id, from, to } => (
                term::tuple(vec![
                    tag,
                    id.clone(),
                    Term::from(from.clone()),
                    Term::from(to.clone()),
                ]),
                None,
            ),
        };

        let mut out = vec![PASS_THROUGH];
        term::encode_term_into(&control, &mut out)?;
        if let Some(message) = payload {
            term::encode_term_into(message, &mut out)?;
        }
        Ok(out)
    }
}

fn arity<const N: usize>(fields: &[Term], tag: i32) -> Result<&[Term; N], ControlError> {
    fields.try_into().map_err(|_| {
        ControlError::Malformed(format!(
            "tag {tag} expects {N} elements, got {}",
            fields.len()
        ))
    })
}

fn pid(term: &Term, field: &str) -> Result<Pid, ControlError> {
    as_pid(term)
        .cloned()
        .ok_or_else(|| ControlError::Malformed(format!("{field} is not a pid: {term}")))
}
