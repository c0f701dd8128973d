//! # beamlink Crypto
//!
//! Authentication primitives for the Erlang distribution handshake.
//!
//! This crate provides:
//! - The challenge digest (`MD5(cookie ++ decimal(challenge))`)
//! - Cookie loading from `~/.erlang.cookie` or an explicit override
//! - Constant-time digest comparison
//!
//! ## Handshake Digest
//!
//! | Input | Encoding |
//! |-------|----------|
//! | Cookie | raw bytes, trailing whitespace trimmed |
//! | Challenge | `u32`, rendered as unsigned decimal ASCII |
//! | Output | 16-byte MD5 digest |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod constant_time;
pub mod cookie;
pub mod digest;
pub mod error;

pub use cookie::Cookie;
pub use digest::{Digest, challenge_to_decimal, gen_digest, verify_digest};
pub use error::CryptoError;

/// Digest output size in bytes
pub const DIGEST_SIZE: usize = 16;

/// Challenge size on the wire in bytes
pub const CHALLENGE_SIZE: usize = 4;
