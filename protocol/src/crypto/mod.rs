//! # Cryptographic Primitives for AutoVault
//!
//! Every identity check and every escrow address flows through here:
//!
//! - **Ed25519** for identities and signatures.
//! - **SHA-256** for program-derived addresses.
//! - **BLAKE3** for transition digests.
//!
//! Everything here is a thin, type-safe wrapper around audited crates.

pub mod derivation;
pub mod hash;
pub mod keys;

pub use derivation::{create_program_address, find_program_address, DerivationError, ProgramAddress};
pub use hash::{blake3_hash, domain_separated_hash, sha256, sha256_multi};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
