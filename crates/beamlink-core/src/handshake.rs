//! Handshake state machine.
//!
//! Drives the connecting side of the distribution handshake:
//!
//! ```text
//! Init ──name──▶ AwaitStatus ──"sok"──▶ AwaitChallenge ──'N'──▶ AwaitChallengeAck ──'a'──▶ Live
//!   └──────────────────────────── any unexpected event ────────────────────────────▶ Failed
//! ```
//!
//! The machine only parses and builds handshake payloads; framing and I/O
//! belong to the caller.

use crate::config::DistConfig;
use crate::error::HandshakeError;
use crate::flags::DistributionFlags;
use beamlink_crypto::{CHALLENGE_SIZE, DIGEST_SIZE, Digest, gen_digest, verify_digest};
use std::sync::Arc;

/// Name message tag
pub const TAG_NAME: u8 = b'N';
/// Challenge message tag (same byte as the name message)
pub const TAG_CHALLENGE: u8 = b'N';
/// Challenge reply tag
pub const TAG_CHALLENGE_REPLY: u8 = b'r';
/// Challenge ack tag
pub const TAG_CHALLENGE_ACK: u8 = b'a';
/// Status payload accepting the connection
pub const STATUS_OK: &[u8] = b"sok";

/// Tag, flags, challenge, creation
const CHALLENGE_FIXED_LEN: usize = 1 + 8 + CHALLENGE_SIZE + 4;
/// Tag and digest
const ACK_LEN: usize = 1 + DIGEST_SIZE;

/// Handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Init,
    /// Name sent, waiting for the status reply
    AwaitStatus,
    /// Status accepted, waiting for the peer's challenge
    AwaitChallenge,
    /// Reply sent, waiting for the peer's digest
    AwaitChallengeAck,
    /// Authenticated
    Live,
    /// Terminal failure
    Failed,
}

/// What the peer told us about itself in its challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Peer node name as sent
    pub name: String,
    /// Peer capability flags
    pub flags: DistributionFlags,
    /// Peer creation
    pub creation: u32,
    /// Challenge the peer asked us to sign
    pub challenge: u32,
}

/// Outcome of feeding one frame to the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Frame accepted, nothing to send
    Continue,
    /// Frame accepted, send this payload
    Reply(Vec<u8>),
    /// Peer authenticated
    Established(PeerInfo),
}

/// Connecting-side handshake
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    config: Arc<DistConfig>,
    peer: Option<PeerInfo>,
}

impl Handshake {
    /// New handshake in `Init`
    #[must_use]
    pub fn new(config: Arc<DistConfig>) -> Self {
        Self {
            state: HandshakeState::Init,
            config,
            peer: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Peer details, once the challenge has been parsed
    #[must_use]
    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    /// Whether the machine reached a terminal state
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, HandshakeState::Live | HandshakeState::Failed)
    }

    /// Check if transition to new state is valid
    #[must_use]
    pub fn can_transition(&self, to: HandshakeState) -> bool {
        use HandshakeState::{AwaitChallenge, AwaitChallengeAck, AwaitStatus, Failed, Init, Live};
        match (self.state, to) {
            (Init, AwaitStatus)
            | (AwaitStatus, AwaitChallenge)
            | (AwaitChallenge, AwaitChallengeAck)
            | (AwaitChallengeAck, Live) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }

    fn transition_to(&mut self, new_state: HandshakeState) -> Result<(), HandshakeError> {
        if !self.can_transition(new_state) {
            return Err(HandshakeError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let old_state = self.state;
        self.state = new_state;

        tracing::debug!(
            "Handshake state transition: {:?} -> {:?}",
            old_state,
            new_state
        );

        Ok(())
    }

    /// Move to `Failed`. Returns `false` if already failed.
    pub fn fail(&mut self) -> bool {
        if self.state == HandshakeState::Failed {
            return false;
        }
        // Every non-failed state may fail.
        let _ = self.transition_to(HandshakeState::Failed);
        true
    }

    /// Build the name message and move to `AwaitStatus`.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::InvalidEvent` unless the state is `Init`.
    pub fn start(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != HandshakeState::Init {
            return Err(HandshakeError::InvalidEvent { state: self.state });
        }

        let name = self.config.node_name.to_string();
        let name_len = u16::try_from(name.len()).unwrap_or(u16::MAX);
        let name = &name.as_bytes()[..usize::from(name_len)];

        let mut msg = Vec::with_capacity(1 + 8 + 4 + 2 + name.len());
        msg.push(TAG_NAME);
        msg.extend_from_slice(&self.config.flags.bits().to_be_bytes());
        msg.extend_from_slice(&self.config.version.to_be_bytes());
        msg.extend_from_slice(&name_len.to_be_bytes());
        msg.extend_from_slice(name);

        self.transition_to(HandshakeState::AwaitStatus)?;
        Ok(msg)
    }

    /// Feed one complete frame payload.
    ///
    /// Any error leaves the machine in `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError` for a refused status, an unexpected tag, a
    /// truncated message, or a digest mismatch.
    pub fn on_frame(&mut self, payload: &[u8]) -> Result<HandshakeStep, HandshakeError> {
        let result = match self.state {
            HandshakeState::AwaitStatus => self.on_status(payload),
            HandshakeState::AwaitChallenge => self.on_challenge(payload),
            HandshakeState::AwaitChallengeAck => self.on_challenge_ack(payload),
            state => Err(HandshakeError::InvalidEvent { state }),
        };
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn on_status(&mut self, payload: &[u8]) -> Result<HandshakeStep, HandshakeError> {
        if payload != STATUS_OK {
            return Err(HandshakeError::UnexpectedStatus(
                String::from_utf8_lossy(payload).into_owned(),
            ));
        }
        self.transition_to(HandshakeState::AwaitChallenge)?;
        Ok(HandshakeStep::Continue)
    }

    fn on_challenge(&mut self, payload: &[u8]) -> Result<HandshakeStep, HandshakeError> {
        let peer = parse_challenge(payload)?;
        let digest = gen_digest(self.config.cookie.as_bytes(), peer.challenge);

        let mut reply = Vec::with_capacity(1 + CHALLENGE_SIZE + DIGEST_SIZE);
        reply.push(TAG_CHALLENGE_REPLY);
        reply.extend_from_slice(&self.config.own_challenge.to_be_bytes());
        reply.extend_from_slice(&digest);

        tracing::debug!(
            peer = %peer.name,
            flags = ?peer.flags,
            creation = peer.creation,
            "Received challenge"
        );
        self.peer = Some(peer);
        self.transition_to(HandshakeState::AwaitChallengeAck)?;
        Ok(HandshakeStep::Reply(reply))
    }

    fn on_challenge_ack(&mut self, payload: &[u8]) -> Result<HandshakeStep, HandshakeError> {
        let state = self.state;
        let Some((&tag, rest)) = payload.split_first() else {
            return Err(HandshakeError::Truncated {
                state,
                expected: ACK_LEN,
                actual: 0,
            });
        };
        if tag != TAG_CHALLENGE_ACK {
            return Err(HandshakeError::UnexpectedTag { state, tag });
        }
        let digest: &Digest = rest
            .get(..DIGEST_SIZE)
            .and_then(|d| d.try_into().ok())
            .ok_or(HandshakeError::Truncated {
                state,
                expected: ACK_LEN,
                actual: payload.len(),
            })?;

        if !verify_digest(
            self.config.cookie.as_bytes(),
            self.config.own_challenge,
            digest,
        ) {
            return Err(HandshakeError::AuthenticationFailure);
        }

        self.transition_to(HandshakeState::Live)?;
        let peer = self.peer.clone().ok_or(HandshakeError::InvalidEvent { state })?;
        Ok(HandshakeStep::Established(peer))
    }
}

/// Parse a challenge message: `'N' | flags(8) | challenge(4) | creation(4) | name`.
///
/// The name is the rest of the message. A leading `u16` that exactly
/// matches the remaining length is a length prefix and is stripped.
///
/// # Errors
///
/// Returns `HandshakeError::UnexpectedTag` or `HandshakeError::Truncated`.
pub fn parse_challenge(payload: &[u8]) -> Result<PeerInfo, HandshakeError> {
    let state = HandshakeState::AwaitChallenge;
    match payload.first() {
        Some(&TAG_CHALLENGE) => {}
        Some(&tag) => return Err(HandshakeError::UnexpectedTag { state, tag }),
        None => {
            return Err(HandshakeError::Truncated {
                state,
                expected: CHALLENGE_FIXED_LEN,
                actual: 0,
            });
        }
    }
    if payload.len() < CHALLENGE_FIXED_LEN {
        return Err(HandshakeError::Truncated {
            state,
            expected: CHALLENGE_FIXED_LEN,
            actual: payload.len(),
        });
    }

    let flags = u64::from_be_bytes(read_array(&payload[1..9]));
    let challenge = u32::from_be_bytes(read_array(&payload[9..13]));
    let creation = u32::from_be_bytes(read_array(&payload[13..17]));
    let mut name = &payload[CHALLENGE_FIXED_LEN..];
    if name.len() >= 2 {
        let prefix = usize::from(u16::from_be_bytes([name[0], name[1]]));
        if prefix == name.len() - 2 {
            name = &name[2..];
        }
    }

    Ok(PeerInfo {
        name: String::from_utf8_lossy(name).into_owned(),
        flags: DistributionFlags::from_bits(flags),
        creation,
        challenge,
    })
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
