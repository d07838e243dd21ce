// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # AutoVault Protocol — Core Primitives
//!
//! AutoVault holds native coin and token balances on behalf of owners in
//! per-owner escrows, and lets a small set of privileged actors (an admin
//! and a rotating crew of operators) perform assisted operations on those
//! escrows without ever touching the owner's private key.
//!
//! This crate holds the pieces every other layer builds on. The custody
//! state machine itself lives in `autovault-contracts`.
//!
//! ## Architecture
//!
//! - **config** — Derivation seeds, reserve defaults, and [`config::VaultParams`].
//! - **crypto** — Ed25519 identities, SHA-256/BLAKE3, program-derived addresses.
//! - **identity** — Signer attestations and verified signer sets.
//! - **ledger** — The asset-ledger capability and an in-memory implementation.
//!
//! ## Design Philosophy
//!
//! 1. Addresses are derived, never stored as free-floating state.
//! 2. Signatures are checked once; everything downstream sees identities.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod identity;
pub mod ledger;

pub use crypto::keys::{Keypair, PublicKey, Signature};
pub use identity::SignerSet;
pub use ledger::{Asset, AssetLedger, InMemoryLedger, LedgerError};
