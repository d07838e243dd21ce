//! State deltas: the observable result of a successful transition.
//!
//! An operation that turns out to be a no-op (re-initializing an existing
//! registry, withdrawing a zero balance, revoking a delegation that does not
//! exist) succeeds with no effects.

use serde::{Deserialize, Serialize};

use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::ledger::Asset;

/// One observable change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    RegistryInitialized {
        address: PublicKey,
        admin: PublicKey,
    },
    AdminChanged {
        previous: PublicKey,
        current: PublicKey,
    },
    OperatorAdded {
        operator: PublicKey,
    },
    OperatorRemoved {
        operator: PublicKey,
    },
    EscrowCreated {
        owner: PublicKey,
        address: PublicKey,
        bump: u8,
        reserve: u64,
    },
    EscrowClosed {
        owner: PublicKey,
        address: PublicKey,
        destination: PublicKey,
        /// Native units swept to the destination, reserve included.
        reclaimed: u64,
    },
    Transferred {
        from: PublicKey,
        to: PublicKey,
        asset: Asset,
        amount: u64,
    },
    TokenAccountOpened {
        holder: PublicKey,
        mint: PublicKey,
        payer: PublicKey,
        reserve: u64,
    },
    TokenAccountClosed {
        holder: PublicKey,
        mint: PublicKey,
        destination: PublicKey,
        reclaimed: u64,
    },
    DelegateApproved {
        escrow: PublicKey,
        mint: PublicKey,
        delegate: PublicKey,
        allowance: u64,
    },
    DelegateRevoked {
        escrow: PublicKey,
        mint: PublicKey,
        delegate: PublicKey,
    },
    AllowanceConsumed {
        escrow: PublicKey,
        mint: PublicKey,
        delegate: PublicKey,
        remaining: u64,
    },
}

/// Everything a transition changed, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDelta {
    pub effects: Vec<Effect>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, effects: impl IntoIterator<Item = Effect>) {
        self.effects.extend(effects);
    }

    /// True when the transition changed nothing.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Sum of every `Transferred` amount of `asset`.
    pub fn transferred(&self, asset: &Asset) -> u128 {
        self.effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Transferred {
                    asset: moved,
                    amount,
                    ..
                } if moved == asset => Some(*amount as u128),
                _ => None,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_delta_is_noop() {
        assert!(StateDelta::new().is_noop());
    }

    #[test]
    fn transferred_sums_matching_asset_only() {
        let a = PublicKey::from_bytes([1; 32]);
        let b = PublicKey::from_bytes([2; 32]);
        let mint = PublicKey::from_bytes([9; 32]);
        let mut delta = StateDelta::new();
        delta.extend([
            Effect::Transferred {
                from: a,
                to: b,
                asset: Asset::Native,
                amount: 5,
            },
            Effect::Transferred {
                from: a,
                to: b,
                asset: Asset::Token(mint),
                amount: 7,
            },
            Effect::Transferred {
                from: b,
                to: a,
                asset: Asset::Native,
                amount: 1,
            },
        ]);
        assert_eq!(delta.transferred(&Asset::Native), 6);
        assert_eq!(delta.transferred(&Asset::Token(mint)), 7);
        assert_eq!(delta.len(), 3);
    }

    #[test]
    fn effects_serialize_with_tag() {
        let operator = PublicKey::from_bytes([3; 32]);
        let json = serde_json::to_value(Effect::OperatorAdded { operator }).unwrap();
        assert_eq!(json["effect"], "operator_added");
    }
}
