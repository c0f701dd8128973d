//! Challenge digest for the distribution handshake.
//!
//! Both sides prove knowledge of the shared cookie by hashing it together
//! with the challenge the other side picked:
//!
//! ```text
//! digest = MD5(cookie || decimal_ascii(challenge))
//! ```
//!
//! The challenge is an unsigned 32-bit value. It must be rendered without
//! sign or precision loss, so `0xFFFF_FFFF` becomes `"4294967295"`.

use crate::DIGEST_SIZE;
use crate::constant_time::verify_16;

/// Handshake digest output (16 bytes).
pub type Digest = [u8; DIGEST_SIZE];

/// Render a challenge as the decimal ASCII string that gets hashed.
#[must_use]
pub fn challenge_to_decimal(challenge: u32) -> String {
    challenge.to_string()
}

/// Compute the handshake digest for `cookie` and `challenge`.
///
/// # Example
///
/// ```
/// use beamlink_crypto::gen_digest;
///
/// let a = gen_digest(b"secret", 42);
/// let b = gen_digest(b"secret", 42);
/// assert_eq!(a, b);
/// assert_ne!(a, gen_digest(b"secret", 43));
/// ```
#[must_use]
pub fn gen_digest(cookie: &[u8], challenge: u32) -> Digest {
    let decimal = challenge_to_decimal(challenge);
    let mut input = Vec::with_capacity(cookie.len() + decimal.len());
    input.extend_from_slice(cookie);
    input.extend_from_slice(decimal.as_bytes());
    md5::compute(&input).0
}

/// Check a digest received from the peer against the expected one.
///
/// The comparison is constant-time.
#[must_use]
pub fn verify_digest(cookie: &[u8], challenge: u32, received: &Digest) -> bool {
    let expected = gen_digest(cookie, challenge);
    verify_16(&expected, received)
}
