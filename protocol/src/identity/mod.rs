//! # Identity Module
//!
//! Who signed a transition. Every participant in AutoVault is an Ed25519
//! public key; a transition carries one [`Attestation`] per signer, and
//! verification turns the attestations into a [`SignerSet`], the only
//! input the authorization policy ever looks at.

pub mod signer;

pub use signer::{verify_attestations, Attestation, SignatureError, SignerSet};
