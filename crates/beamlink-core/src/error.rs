//! Error types for the beamlink protocol engine.

use crate::handshake::HandshakeState;
use thiserror::Error;

/// `name@host` parsing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid node identifier {input:?}: {reason}")]
pub struct NodeIdError {
    /// The rejected input
    pub input: String,
    /// Why it was rejected
    pub reason: &'static str,
}

/// Frame-level errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload does not fit the current length header
    #[error("payload of {len} bytes exceeds the {width}-byte length header")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Header width in bytes
        width: usize,
    },

    /// Peer announced a frame larger than the configured limit
    #[error("incoming frame of {len} bytes exceeds the {limit}-byte limit")]
    LimitExceeded {
        /// Announced payload length
        len: usize,
        /// Configured limit
        limit: usize,
    },
}

/// Handshake errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Status reply other than `sok`
    #[error("peer refused connection with status {0:?}")]
    UnexpectedStatus(String),

    /// Message tag not valid for the current state
    #[error("unexpected tag {tag:#04x} in state {state:?}")]
    UnexpectedTag {
        /// State the handshake was in
        state: HandshakeState,
        /// Tag that arrived
        tag: u8,
    },

    /// Message shorter than its fixed fields
    #[error("truncated message in state {state:?}: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// State the handshake was in
        state: HandshakeState,
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Peer's digest does not match the cookie
    #[error("challenge digest mismatch")]
    AuthenticationFailure,

    /// Event arrived in a state that does not accept it
    #[error("no event expected in state {state:?}")]
    InvalidEvent {
        /// State the handshake was in
        state: HandshakeState,
    },

    /// Illegal state transition
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state
        from: HandshakeState,
        /// Requested state
        to: HandshakeState,
    },
}

/// Control message errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Live frame without the pass-through marker
    #[error("expected pass-through marker, got {0:#04x}")]
    MissingMarker(u8),

    /// Control term is not a tuple of the expected shape
    #[error("malformed control tuple: {0}")]
    Malformed(String),

    /// Operation tag is not one this client understands
    #[error("unknown control tag {0}")]
    UnknownTag(i32),

    /// `send` / `reg_send` without a message term
    #[error("control tag {0} requires a payload term")]
    MissingPayload(i32),

    /// Control or payload term failed to decode
    #[error("undecodable term: {0}")]
    Term(String),
}

/// External term format errors
#[derive(Debug, Error)]
pub enum TermError {
    /// Encoding failed
    #[error("encode failed: {0}")]
    Encode(#[from] eetf::EncodeError),

    /// Decoding failed
    #[error("decode failed: {0}")]
    Decode(#[from] eetf::DecodeError),
}

/// Reasons a connection is torn down.
///
/// None of these are retried. A later request to the same node opens a
/// fresh connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Unexpected tag or event during the handshake
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Digest mismatch, usually a cookie mismatch
    #[error("authentication with {node} failed (cookie mismatch?)")]
    AuthenticationFailure {
        /// Peer node
        node: String,
    },

    /// Peer closed the stream or the network failed
    #[error("transport closed")]
    TransportClosed,

    /// Live frame carried an undecodable or unknown control tuple
    #[error("malformed control tuple: {0}")]
    MalformedControlTuple(String),

    /// Handshake did not complete in the configured time
    #[error("handshake timed out")]
    HandshakeTimeout,
}

impl ConnectionError {
    /// Whether this failure is an authentication (cookie) problem
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationFailure { .. })
    }

    /// Map a handshake error for `node` onto a connection failure.
    #[must_use]
    pub fn from_handshake(err: &HandshakeError, node: &str) -> Self {
        match err {
            HandshakeError::AuthenticationFailure => Self::AuthenticationFailure {
                node: node.to_string(),
            },
            other => Self::ProtocolViolation(other.to_string()),
        }
    }
}

impl From<ControlError> for ConnectionError {
    fn from(err: ControlError) -> Self {
        Self::MalformedControlTuple(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_is_distinct() {
        let err = ConnectionError::from_handshake(&HandshakeError::AuthenticationFailure, "a@b");
        assert!(err.is_authentication());
        assert_eq!(err.to_string(), "authentication with a@b failed (cookie mismatch?)");

        let err = ConnectionError::from_handshake(
            &HandshakeError::UnexpectedStatus("nok".into()),
            "a@b",
        );
        assert!(!err.is_authentication());
        assert!(matches!(err, ConnectionError::ProtocolViolation(_)));
    }

    #[test]
    fn test_control_error_maps_to_malformed() {
        let err: ConnectionError = ControlError::UnknownTag(99).into();
        assert_eq!(
            err,
            ConnectionError::MalformedControlTuple("unknown control tag 99".into())
        );
    }

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::PayloadTooLarge {
            len: 70_000,
            width: 2,
        };
        assert_eq!(
            err.to_string(),
            "payload of 70000 bytes exceeds the 2-byte length header"
        );
    }
}
