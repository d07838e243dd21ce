//! # Asset Ledger
//!
//! The ledger is where balances actually live. The custody core never
//! touches a balance directly: it authorizes a movement and then asks an
//! [`AssetLedger`] to perform it.
//!
//! ## Model
//!
//! ```text
//! native  : holder -> u64                       (implicit, every holder has one)
//! tokens  : holder -> mint -> TokenAccount      (explicit, opened and closed)
//! ```
//!
//! A token account must be opened before it can receive anything. Opening
//! costs a native *reserve* paid by whoever opens it; closing an empty
//! account releases that reserve to a destination of the closer's choice.
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u64` in smallest-unit denomination.** No floating
//!    point anywhere.
//! 2. **Every mutation is checked before it is applied.** A failed
//!    `transfer` leaves both sides untouched.
//! 3. **Serializable state.** [`InMemoryLedger`] derives serde so a host can
//!    snapshot it between calls.

pub mod memory;

pub use memory::{InMemoryLedger, TokenAccount};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::keys::PublicKey;

/// What a balance is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The chain's native coin. Reserves are paid in it.
    Native,
    /// A fungible token identified by its mint.
    Token(PublicKey),
}

impl Asset {
    /// The mint, for token assets.
    pub fn mint(&self) -> Option<&PublicKey> {
        match self {
            Asset::Native => None,
            Asset::Token(mint) => Some(mint),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(mint) => write!(f, "token:{}", mint),
        }
    }
}

/// Errors raised by a ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds in {holder} ({asset}): available {available}, requested {requested}")]
    InsufficientFunds {
        holder: PublicKey,
        asset: Asset,
        available: u64,
        requested: u64,
    },

    /// Crediting would exceed `u64::MAX`. Either a bug or an attack.
    #[error("balance overflow crediting {amount} to {holder} ({asset})")]
    Overflow {
        holder: PublicKey,
        asset: Asset,
        amount: u64,
    },

    #[error("no token account for mint {mint} held by {holder}")]
    AccountNotFound { holder: PublicKey, mint: PublicKey },

    #[error("token account {holder}/{mint} still holds {balance}")]
    AccountNotEmpty {
        holder: PublicKey,
        mint: PublicKey,
        balance: u64,
    },
}

/// A token account as seen from outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountView {
    pub mint: PublicKey,
    pub amount: u64,
    pub reserve: u64,
}

/// The balance-moving capability the custody core relies on.
///
/// Implementations must apply each call atomically: either the whole
/// movement happens or the ledger is unchanged and an error is returned.
pub trait AssetLedger {
    /// Current balance of `holder` in `asset`. Missing accounts read as 0.
    fn balance(&self, holder: &PublicKey, asset: &Asset) -> u64;

    /// Whether `holder` has an open token account for `mint`.
    fn has_token_account(&self, holder: &PublicKey, mint: &PublicKey) -> bool;

    /// Every open token account of `holder`, ordered by mint.
    fn token_accounts(&self, holder: &PublicKey) -> Vec<TokenAccountView>;

    /// Open a token account for (`holder`, `mint`), charging `reserve`
    /// native units to `payer`. Idempotent: returns `Ok(false)` without
    /// charging anything if the account already exists.
    fn open_token_account(
        &mut self,
        payer: &PublicKey,
        holder: &PublicKey,
        mint: &PublicKey,
        reserve: u64,
    ) -> Result<bool, LedgerError>;

    /// Close an empty token account, crediting its reserve to
    /// `destination`. Returns the reserve released.
    fn close_token_account(
        &mut self,
        holder: &PublicKey,
        mint: &PublicKey,
        destination: &PublicKey,
    ) -> Result<u64, LedgerError>;

    /// Move `amount` of `asset` from `from` to `to`.
    fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        asset: &Asset,
        amount: u64,
    ) -> Result<(), LedgerError>;

    /// Create `amount` of `asset` in `to`. Test fixtures and devnet only.
    fn mint(&mut self, to: &PublicKey, asset: &Asset, amount: u64) -> Result<(), LedgerError>;

    /// Destroy `amount` of `asset` held by `from`. Test fixtures and devnet only.
    fn burn(&mut self, from: &PublicKey, asset: &Asset, amount: u64) -> Result<(), LedgerError>;
}
