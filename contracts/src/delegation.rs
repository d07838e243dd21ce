//! # Delegation Manager
//!
//! An owner can grant one delegate per (escrow, mint) a bounded allowance
//! over the escrow's token account. Approving again replaces the previous
//! delegate and allowance outright; allowances never accumulate.
//!
//! Spending through the delegation decrements the allowance, and the
//! delegation disappears once the allowance reaches zero. Revoking,
//! closing the token account, or closing the escrow also removes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use autovault_protocol::crypto::keys::PublicKey;

use crate::error::VaultError;
use crate::policy::Requirement;

/// A delegate and what it may still spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegate: PublicKey,
    pub allowance: u64,
}

/// Active delegations, keyed by escrow address then mint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationBook {
    by_escrow: BTreeMap<PublicKey, BTreeMap<PublicKey, Delegation>>,
}

impl DelegationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, escrow: &PublicKey, mint: &PublicKey) -> Option<&Delegation> {
        self.by_escrow.get(escrow).and_then(|mints| mints.get(mint))
    }

    /// Install `delegate` with `allowance`, returning whatever it replaced.
    pub(crate) fn approve(
        &mut self,
        escrow: PublicKey,
        mint: PublicKey,
        delegate: PublicKey,
        allowance: u64,
    ) -> Option<Delegation> {
        self.by_escrow
            .entry(escrow)
            .or_default()
            .insert(mint, Delegation { delegate, allowance })
    }

    /// Remove the delegation on (`escrow`, `mint`), if any.
    pub(crate) fn revoke(&mut self, escrow: &PublicKey, mint: &PublicKey) -> Option<Delegation> {
        let mints = self.by_escrow.get_mut(escrow)?;
        let removed = mints.remove(mint);
        if mints.is_empty() {
            self.by_escrow.remove(escrow);
        }
        removed
    }

    /// Drop every delegation on `escrow`. Returns them ordered by mint.
    pub(crate) fn clear_escrow(&mut self, escrow: &PublicKey) -> Vec<(PublicKey, Delegation)> {
        self.by_escrow
            .remove(escrow)
            .map(|mints| mints.into_iter().collect())
            .unwrap_or_default()
    }

    /// Spend `amount` of the allowance. Returns the remaining allowance;
    /// the delegation is removed when it reaches zero.
    pub(crate) fn consume(
        &mut self,
        escrow: &PublicKey,
        mint: &PublicKey,
        amount: u64,
    ) -> Result<u64, VaultError> {
        let Some(delegation) = self.get(escrow, mint).copied() else {
            return Err(VaultError::unauthorized(Requirement::DelegateOnly));
        };

        let remaining =
            delegation
                .allowance
                .checked_sub(amount)
                .ok_or(VaultError::InsufficientAllowance {
                    delegate: delegation.delegate,
                    mint: *mint,
                    allowance: delegation.allowance,
                    requested: amount,
                })?;

        if remaining == 0 {
            self.revoke(escrow, mint);
        } else if let Some(entry) = self
            .by_escrow
            .get_mut(escrow)
            .and_then(|mints| mints.get_mut(mint))
        {
            entry.allowance = remaining;
        }
        Ok(remaining)
    }

    /// Number of active delegations across all escrows.
    pub fn len(&self) -> usize {
        self.by_escrow.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_escrow.is_empty()
    }
}
