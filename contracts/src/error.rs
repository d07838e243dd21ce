//! Errors returned by vault operations.
//!
//! Every error is terminal for the transition that produced it: the vault
//! rolls back to its pre-transition state and nothing is retried.

use autovault_protocol::crypto::derivation::DerivationError;
use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::ledger::{Asset, LedgerError};
use thiserror::Error;

use crate::policy::Requirement;

/// Errors that can occur during vault operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The signer set does not satisfy the operation's requirement.
    #[error("unauthorized: requires {required}")]
    Unauthorized {
        /// The predicate that failed.
        required: Requirement,
    },

    /// Admin or operator authority was needed but no registry exists yet.
    #[error("registry has not been initialized")]
    RegistryNotFound,

    /// No escrow has ever been created for this owner.
    #[error("no escrow for owner {owner} (address {address})")]
    EscrowNotFound {
        owner: PublicKey,
        address: PublicKey,
    },

    /// The escrow exists but has been closed. Closed is terminal.
    #[error("escrow {address} is closed")]
    AlreadyClosed { address: PublicKey },

    /// A token account the operation needs does not exist.
    #[error("no token account for mint {mint} held by {holder}")]
    AccountNotFound { holder: PublicKey, mint: PublicKey },

    /// A close was attempted while value remains.
    #[error("{holder} still holds {balance} of {asset}")]
    NotEmpty {
        holder: PublicKey,
        asset: Asset,
        balance: u64,
    },

    #[error("insufficient funds in {holder} ({asset}): available {available}, requested {requested}")]
    InsufficientFunds {
        holder: PublicKey,
        asset: Asset,
        available: u64,
        requested: u64,
    },

    /// A delegate tried to spend beyond its allowance.
    #[error("allowance for {delegate} on mint {mint} is {allowance}, requested {requested}")]
    InsufficientAllowance {
        delegate: PublicKey,
        mint: PublicKey,
        allowance: u64,
        requested: u64,
    },

    /// The amount cannot be represented by the receiving balance.
    #[error("amount {amount} of {asset} exceeds the representable range")]
    InvalidAmount { asset: Asset, amount: u64 },

    #[error("operator set is full ({limit} members)")]
    OperatorLimitReached { limit: usize },

    #[error("transition has no steps")]
    EmptyTransition,

    #[error("address derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}

impl VaultError {
    pub(crate) fn unauthorized(required: Requirement) -> Self {
        VaultError::Unauthorized { required }
    }
}

impl From<LedgerError> for VaultError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                holder,
                asset,
                available,
                requested,
            } => VaultError::InsufficientFunds {
                holder,
                asset,
                available,
                requested,
            },
            LedgerError::Overflow { asset, amount, .. } => VaultError::InvalidAmount { asset, amount },
            LedgerError::AccountNotFound { holder, mint } => {
                VaultError::AccountNotFound { holder, mint }
            }
            LedgerError::AccountNotEmpty {
                holder,
                mint,
                balance,
            } => VaultError::NotEmpty {
                holder,
                asset: Asset::Token(mint),
                balance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_overflow_maps_to_invalid_amount() {
        let holder = PublicKey::from_bytes([1; 32]);
        let err: VaultError = LedgerError::Overflow {
            holder,
            asset: Asset::Native,
            amount: 5,
        }
        .into();
        assert_eq!(
            err,
            VaultError::InvalidAmount {
                asset: Asset::Native,
                amount: 5
            }
        );
    }

    #[test]
    fn ledger_not_empty_maps_to_token_asset() {
        let holder = PublicKey::from_bytes([1; 32]);
        let mint = PublicKey::from_bytes([2; 32]);
        let err: VaultError = LedgerError::AccountNotEmpty {
            holder,
            mint,
            balance: 3,
        }
        .into();
        assert_eq!(
            err,
            VaultError::NotEmpty {
                holder,
                asset: Asset::Token(mint),
                balance: 3
            }
        );
    }

    #[test]
    fn unauthorized_message_names_requirement() {
        let err = VaultError::unauthorized(Requirement::AdminOnly);
        assert_eq!(err.to_string(), "unauthorized: requires admin signature");
    }
}
