//! Cryptographically secure random generation.
//!
//! Used for SAML message identifiers and relay-state tokens, which must be
//! unguessable.

use rand::Rng;

/// Generates a cryptographically secure random byte array.
///
/// Uses the thread-local random number generator which is cryptographically
/// secure by default.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

/// Generates `len` random bytes and returns them hex encoded (lowercase).
///
/// The resulting string is `2 * len` characters long.
#[must_use]
pub fn random_hex(len: usize) -> String {
    hex::encode(random_bytes(len))
}
