//! # Program-Derived Addresses
//!
//! An escrow's address must be recomputable from its owner's identity alone,
//! with no stored randomness, and nobody may hold a private key for it. Both
//! properties come from the same construction:
//!
//! ```text
//! candidate = SHA-256(seed_0 ‖ … ‖ seed_n ‖ bump ‖ program_id ‖ "ProgramDerivedAddress")
//! ```
//!
//! A candidate that happens to decode to a valid Ed25519 point is rejected,
//! and the search moves on to the next bump (255 downwards). The first
//! accepted bump is the *canonical* bump; storing it lets anyone re-verify
//! the address with a single hash instead of repeating the search.

use thiserror::Error;

use super::hash::sha256_multi;
use super::keys::PublicKey;

/// Suffix mixed into every derivation so derived addresses can never collide
/// with hashes computed for other purposes.
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum length of a single seed, in bytes.
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, including the bump.
pub const MAX_SEEDS: usize = 16;

/// Errors from address derivation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("seed {index} is {len} bytes, maximum is {MAX_SEED_LEN}")]
    SeedTooLong { index: usize, len: usize },

    #[error("too many seeds: {count}, maximum is {MAX_SEEDS}")]
    TooManySeeds { count: usize },

    #[error("derived address lies on the Ed25519 curve")]
    OnCurve,

    #[error("no off-curve address exists for any bump seed")]
    NoViableBump,
}

/// A derived address together with the bump that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAddress {
    pub address: PublicKey,
    pub bump: u8,
}

/// Derive an address from the given seeds (bump already included).
///
/// # Errors
///
/// Returns [`DerivationError::OnCurve`] when the hash is a valid curve point.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &PublicKey,
) -> Result<PublicKey, DerivationError> {
    if seeds.len() > MAX_SEEDS {
        return Err(DerivationError::TooManySeeds { count: seeds.len() });
    }
    if let Some((index, seed)) = seeds.iter().enumerate().find(|(_, s)| s.len() > MAX_SEED_LEN) {
        return Err(DerivationError::SeedTooLong {
            index,
            len: seed.len(),
        });
    }

    let mut parts: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 2);
    parts.extend_from_slice(seeds);
    parts.push(program_id.as_bytes());
    parts.push(PDA_MARKER);

    let candidate = PublicKey::from_bytes(sha256_multi(&parts));
    if candidate.is_on_curve() {
        return Err(DerivationError::OnCurve);
    }
    Ok(candidate)
}

/// Find the canonical (highest viable) bump for `seeds` and return the
/// resulting address.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &PublicKey,
) -> Result<ProgramAddress, DerivationError> {
    // Leave room for the bump itself.
    if seeds.len() >= MAX_SEEDS {
        return Err(DerivationError::TooManySeeds {
            count: seeds.len() + 1,
        });
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        with_bump.extend_from_slice(seeds);
        with_bump.push(&bump_seed);

        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok(ProgramAddress { address, bump }),
            Err(DerivationError::OnCurve) => continue,
            Err(other) => return Err(other),
        }
    }

    Err(DerivationError::NoViableBump)
}
