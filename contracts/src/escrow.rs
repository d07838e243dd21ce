//! # Escrow Directory
//!
//! Each owner has at most one escrow, at an address derived from
//! `["userVault", owner]` under the vault's program id. The address is a
//! function of the owner alone: nobody can squat another owner's escrow,
//! and the owner never has to remember where their escrow is.
//!
//! ## Lifecycle
//!
//! ```text
//!   Uninitialized ──initialize_escrow──▶ Active ──close_escrow──▶ Closed
//!                                          │ ▲
//!                                          └─┘ initialize_escrow (no-op)
//! ```
//!
//! `Closed` is terminal. The directory keeps closed records so that a
//! second close, or any custody operation on a closed escrow, fails with
//! [`VaultError::AlreadyClosed`] rather than looking like a fresh owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use autovault_protocol::config::ESCROW_SEED;
use autovault_protocol::crypto::derivation::{
    create_program_address, find_program_address, DerivationError, ProgramAddress,
};
use autovault_protocol::crypto::keys::PublicKey;

use crate::error::VaultError;

/// Derive the escrow address for `owner` under `program_id`.
pub fn derive_escrow_address(
    program_id: &PublicKey,
    owner: &PublicKey,
) -> Result<ProgramAddress, DerivationError> {
    find_program_address(&[ESCROW_SEED, owner.as_bytes()], program_id)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an escrow is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// No record exists. Never stored; reported for unknown owners.
    Uninitialized,
    Active,
    Closed,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowStatus::Uninitialized => write!(f, "Uninitialized"),
            EscrowStatus::Active => write!(f, "Active"),
            EscrowStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// A per-owner escrow record.
///
/// The owner and derived address are fixed at creation. The `bump` is the
/// derivation proof: together with the owner and program id it recomputes
/// `address` with a single hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    owner: PublicKey,
    address: PublicKey,
    bump: u8,
    status: EscrowStatus,
    /// Native units locked in the escrow while it is active.
    reserve: u64,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// A new active escrow record.
    pub fn open(owner: PublicKey, derived: ProgramAddress, reserve: u64) -> Self {
        Self {
            owner,
            address: derived.address,
            bump: derived.bump,
            status: EscrowStatus::Active,
            reserve,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn owner(&self) -> &PublicKey {
        &self.owner
    }

    pub fn address(&self) -> &PublicKey {
        &self.address
    }

    pub fn bump(&self) -> u8 {
        self.bump
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn reserve(&self) -> u64 {
        self.reserve
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn is_active(&self) -> bool {
        self.status == EscrowStatus::Active
    }

    /// Recompute the address from `(owner, bump)` and compare.
    pub fn verify_derivation(&self, program_id: &PublicKey) -> bool {
        create_program_address(
            &[ESCROW_SEED, self.owner.as_bytes(), &[self.bump]],
            program_id,
        )
        .map(|address| address == self.address)
        .unwrap_or(false)
    }

    /// Spendable native balance given the escrow's current native holding.
    pub fn spendable(&self, native_balance: u64) -> u64 {
        native_balance.saturating_sub(self.reserve)
    }

    pub(crate) fn mark_closed(&mut self) {
        self.status = EscrowStatus::Closed;
        self.closed_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Every escrow the vault has ever created, keyed by derived address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowDirectory {
    escrows: BTreeMap<PublicKey, Escrow>,
}

impl EscrowDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &PublicKey) -> Option<&Escrow> {
        self.escrows.get(address)
    }

    pub(crate) fn get_mut(&mut self, address: &PublicKey) -> Option<&mut Escrow> {
        self.escrows.get_mut(address)
    }

    /// Lifecycle state of the escrow at `address`.
    pub fn status(&self, address: &PublicKey) -> EscrowStatus {
        self.escrows
            .get(address)
            .map(Escrow::status)
            .unwrap_or(EscrowStatus::Uninitialized)
    }

    /// The active escrow of `owner`, or why there isn't one.
    pub fn active(&self, program_id: &PublicKey, owner: &PublicKey) -> Result<&Escrow, VaultError> {
        let derived = derive_escrow_address(program_id, owner)?;
        match self.escrows.get(&derived.address) {
            None => Err(VaultError::EscrowNotFound {
                owner: *owner,
                address: derived.address,
            }),
            Some(escrow) if !escrow.is_active() => Err(VaultError::AlreadyClosed {
                address: derived.address,
            }),
            Some(escrow) => Ok(escrow),
        }
    }

    /// Record a newly created escrow. Returns `false` if one already exists
    /// at that address.
    pub(crate) fn insert(&mut self, escrow: Escrow) -> bool {
        if self.escrows.contains_key(&escrow.address) {
            return false;
        }
        self.escrows.insert(escrow.address, escrow);
        true
    }

    pub fn len(&self) -> usize {
        self.escrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Escrow> {
        self.escrows.values()
    }
}
