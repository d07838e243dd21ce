//! # Hashing Utilities
//!
//! Two hash functions, each with one job:
//!
//! - **SHA-256** — program-derived addresses. The derivation must be
//!   recomputable by any client from the owner identity alone, so it uses
//!   the hash every wallet SDK already ships.
//!
//! - **BLAKE3** — everything internal: transition digests and signing
//!   payloads. Domain separation uses BLAKE3's `derive_key` mode.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use autovault_protocol::crypto::sha256;
///
/// let hash = sha256(b"autovault");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256_multi(&[data])
}

/// SHA-256 over several byte slices fed in order, without concatenating
/// them into a temporary buffer first.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3 with a context string.
///
/// `domain_separated_hash("a", data)` and `domain_separated_hash("b", data)`
/// never collide. Uses BLAKE3's `derive_key` mode rather than a prefixed tag.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
