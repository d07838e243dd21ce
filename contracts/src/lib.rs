//! # AutoVault Custody Core
//!
//! The custody state machine: who may move what out of which escrow.
//!
//! - **Registry** — one admin and a bounded operator set.
//! - **Escrow Directory** — one escrow per owner at a derived address,
//!   created once and closed once.
//! - **Custody** — native and token transfers, withdrawals, and token
//!   account management, always authorized before any balance moves.
//! - **Delegation** — per-asset spending allowances granted by owners.
//! - **Policy** — the predicates every operation is checked against.
//!
//! Balances themselves live behind the [`AssetLedger`] capability from
//! `autovault-protocol`; the core only authorizes calls into it.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked: a failed check leaves every
//!    balance where it was.
//! 2. Lifecycle is explicit: enum variants, not boolean flags.
//! 3. Authorization runs before balance checks, so an unauthorized caller
//!    learns nothing about balances.
//! 4. A transition commits entirely or not at all.
//!
//! [`AssetLedger`]: autovault_protocol::ledger::AssetLedger

pub mod command;
mod custody;
pub mod delegation;
pub mod delta;
pub mod error;
pub mod escrow;
pub mod policy;
pub mod registry;
pub mod vault;

pub use command::{Command, SignedTransition, Transition, TransitionAuthError};
pub use delegation::{Delegation, DelegationBook};
pub use delta::{Effect, StateDelta};
pub use error::VaultError;
pub use escrow::{derive_escrow_address, Escrow, EscrowDirectory, EscrowStatus};
pub use policy::{authorize, PolicyContext, Requirement};
pub use registry::{derive_registry_address, Registry};
pub use vault::Vault;
