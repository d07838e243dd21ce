//! In-memory [`AssetLedger`] used by tests, benchmarks, and the devnet host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Asset, AssetLedger, LedgerError, TokenAccountView};
use crate::crypto::keys::PublicKey;

/// A single token account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    /// Token balance in smallest units.
    pub amount: u64,
    /// Native units locked at open time, returned on close.
    pub reserve: u64,
}

/// A ledger held entirely in memory.
///
/// Maps are `BTreeMap`s so snapshots serialize in a stable order. Native
/// entries that drop to zero are pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLedger {
    native: BTreeMap<PublicKey, u64>,
    tokens: BTreeMap<PublicKey, BTreeMap<PublicKey, TokenAccount>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every native balance plus every locked reserve. Useful for
    /// asserting that movements conserve value.
    pub fn total_native(&self) -> u128 {
        let free: u128 = self.native.values().map(|v| *v as u128).sum();
        let locked: u128 = self
            .tokens
            .values()
            .flat_map(|accounts| accounts.values())
            .map(|a| a.reserve as u128)
            .sum();
        free + locked
    }

    fn account(&self, holder: &PublicKey, mint: &PublicKey) -> Result<&TokenAccount, LedgerError> {
        self.tokens
            .get(holder)
            .and_then(|accounts| accounts.get(mint))
            .ok_or(LedgerError::AccountNotFound {
                holder: *holder,
                mint: *mint,
            })
    }

    fn account_mut(
        &mut self,
        holder: &PublicKey,
        mint: &PublicKey,
    ) -> Result<&mut TokenAccount, LedgerError> {
        self.tokens
            .get_mut(holder)
            .and_then(|accounts| accounts.get_mut(mint))
            .ok_or(LedgerError::AccountNotFound {
                holder: *holder,
                mint: *mint,
            })
    }

    fn native_balance(&self, holder: &PublicKey) -> u64 {
        self.native.get(holder).copied().unwrap_or(0)
    }

    fn set_native(&mut self, holder: &PublicKey, amount: u64) {
        if amount == 0 {
            self.native.remove(holder);
        } else {
            self.native.insert(*holder, amount);
        }
    }

    fn credit_native(&mut self, holder: &PublicKey, amount: u64) -> Result<(), LedgerError> {
        let credited = self
            .native_balance(holder)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow {
                holder: *holder,
                asset: Asset::Native,
                amount,
            })?;
        self.set_native(holder, credited);
        Ok(())
    }
}

impl AssetLedger for InMemoryLedger {
    fn balance(&self, holder: &PublicKey, asset: &Asset) -> u64 {
        match asset {
            Asset::Native => self.native_balance(holder),
            Asset::Token(mint) => self.account(holder, mint).map(|a| a.amount).unwrap_or(0),
        }
    }

    fn has_token_account(&self, holder: &PublicKey, mint: &PublicKey) -> bool {
        self.account(holder, mint).is_ok()
    }

    fn token_accounts(&self, holder: &PublicKey) -> Vec<TokenAccountView> {
        self.tokens
            .get(holder)
            .map(|accounts| {
                accounts
                    .iter()
                    .map(|(mint, a)| TokenAccountView {
                        mint: *mint,
                        amount: a.amount,
                        reserve: a.reserve,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn open_token_account(
        &mut self,
        payer: &PublicKey,
        holder: &PublicKey,
        mint: &PublicKey,
        reserve: u64,
    ) -> Result<bool, LedgerError> {
        if self.has_token_account(holder, mint) {
            return Ok(false);
        }

        let available = self.native_balance(payer);
        if available < reserve {
            return Err(LedgerError::InsufficientFunds {
                holder: *payer,
                asset: Asset::Native,
                available,
                requested: reserve,
            });
        }

        self.set_native(payer, available - reserve);
        self.tokens
            .entry(*holder)
            .or_default()
            .insert(*mint, TokenAccount { amount: 0, reserve });
        Ok(true)
    }

    fn close_token_account(
        &mut self,
        holder: &PublicKey,
        mint: &PublicKey,
        destination: &PublicKey,
    ) -> Result<u64, LedgerError> {
        let account = *self.account(holder, mint)?;
        if account.amount > 0 {
            return Err(LedgerError::AccountNotEmpty {
                holder: *holder,
                mint: *mint,
                balance: account.amount,
            });
        }

        // Credit first: the only failure left is overflow, and nothing has
        // been removed yet.
        self.credit_native(destination, account.reserve)?;

        if let Some(accounts) = self.tokens.get_mut(holder) {
            accounts.remove(mint);
            if accounts.is_empty() {
                self.tokens.remove(holder);
            }
        }
        Ok(account.reserve)
    }

    fn transfer(
        &mut self,
        from: &PublicKey,
        to: &PublicKey,
        asset: &Asset,
        amount: u64,
    ) -> Result<(), LedgerError> {
        match asset {
            Asset::Native => {
                let available = self.native_balance(from);
                if available < amount {
                    return Err(LedgerError::InsufficientFunds {
                        holder: *from,
                        asset: *asset,
                        available,
                        requested: amount,
                    });
                }
                if from == to {
                    return Ok(());
                }
                let credited = self.native_balance(to).checked_add(amount).ok_or(
                    LedgerError::Overflow {
                        holder: *to,
                        asset: *asset,
                        amount,
                    },
                )?;
                self.set_native(from, available - amount);
                self.set_native(to, credited);
            }
            Asset::Token(mint) => {
                let available = self.account(from, mint)?.amount;
                let current = self.account(to, mint)?.amount;
                if available < amount {
                    return Err(LedgerError::InsufficientFunds {
                        holder: *from,
                        asset: *asset,
                        available,
                        requested: amount,
                    });
                }
                if from == to {
                    return Ok(());
                }
                let credited = current.checked_add(amount).ok_or(LedgerError::Overflow {
                    holder: *to,
                    asset: *asset,
                    amount,
                })?;
                self.account_mut(from, mint)?.amount = available - amount;
                self.account_mut(to, mint)?.amount = credited;
            }
        }
        Ok(())
    }

    fn mint(&mut self, to: &PublicKey, asset: &Asset, amount: u64) -> Result<(), LedgerError> {
        match asset {
            Asset::Native => self.credit_native(to, amount),
            Asset::Token(mint) => {
                let account = self.account_mut(to, mint)?;
                account.amount =
                    account
                        .amount
                        .checked_add(amount)
                        .ok_or(LedgerError::Overflow {
                            holder: *to,
                            asset: *asset,
                            amount,
                        })?;
                Ok(())
            }
        }
    }

    fn burn(&mut self, from: &PublicKey, asset: &Asset, amount: u64) -> Result<(), LedgerError> {
        let available = match asset {
            Asset::Native => self.native_balance(from),
            Asset::Token(mint) => self.account(from, mint)?.amount,
        };
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                holder: *from,
                asset: *asset,
                available,
                requested: amount,
            });
        }
        match asset {
            Asset::Native => self.set_native(from, available - amount),
            Asset::Token(mint) => self.account_mut(from, mint)?.amount = available - amount,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> PublicKey {
        PublicKey::from_bytes([n; 32])
    }

    fn funded(holder: PublicKey, native: u64) -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&holder, &Asset::Native, native).unwrap();
        ledger
    }

    #[test]
    fn native_transfer_moves_balance() {
        let (a, b) = (key(1), key(2));
        let mut ledger = funded(a, 100);
        ledger.transfer(&a, &b, &Asset::Native, 40).unwrap();
        assert_eq!(ledger.balance(&a, &Asset::Native), 60);
        assert_eq!(ledger.balance(&b, &Asset::Native), 40);
    }

    #[test]
    fn overdraft_leaves_both_sides_untouched() {
        let (a, b) = (key(1), key(2));
        let mut ledger = funded(a, 10);
        let err = ledger.transfer(&a, &b, &Asset::Native, 11).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                available: 10,
                requested: 11,
                ..
            }
        ));
        assert_eq!(ledger.balance(&a, &Asset::Native), 10);
        assert_eq!(ledger.balance(&b, &Asset::Native), 0);
    }

    #[test]
    fn token_transfer_requires_open_recipient() {
        let (a, b, mint) = (key(1), key(2), key(9));
        let mut ledger = funded(a, 1_000);
        ledger.open_token_account(&a, &a, &mint, 100).unwrap();
        ledger.mint(&a, &Asset::Token(mint), 50).unwrap();

        let err = ledger.transfer(&a, &b, &Asset::Token(mint), 5).unwrap_err();
        assert_eq!(err, LedgerError::AccountNotFound { holder: b, mint });

        ledger.open_token_account(&a, &b, &mint, 100).unwrap();
        ledger.transfer(&a, &b, &Asset::Token(mint), 5).unwrap();
        assert_eq!(ledger.balance(&b, &Asset::Token(mint)), 5);
    }

    #[test]
    fn open_charges_reserve_once() {
        let (payer, holder, mint) = (key(1), key(2), key(9));
        let mut ledger = funded(payer, 500);
        assert!(ledger.open_token_account(&payer, &holder, &mint, 200).unwrap());
        assert!(!ledger.open_token_account(&payer, &holder, &mint, 200).unwrap());
        assert_eq!(ledger.balance(&payer, &Asset::Native), 300);
    }

    #[test]
    fn open_without_reserve_funds_fails() {
        let (payer, holder, mint) = (key(1), key(2), key(9));
        let mut ledger = funded(payer, 10);
        assert!(ledger.open_token_account(&payer, &holder, &mint, 200).is_err());
        assert!(!ledger.has_token_account(&holder, &mint));
    }

    #[test]
    fn close_returns_reserve_to_destination() {
        let (payer, holder, dest, mint) = (key(1), key(2), key(3), key(9));
        let mut ledger = funded(payer, 500);
        ledger.open_token_account(&payer, &holder, &mint, 200).unwrap();
        let before = ledger.total_native();

        assert_eq!(ledger.close_token_account(&holder, &mint, &dest).unwrap(), 200);
        assert_eq!(ledger.balance(&dest, &Asset::Native), 200);
        assert!(!ledger.has_token_account(&holder, &mint));
        assert_eq!(ledger.total_native(), before);
    }

    #[test]
    fn close_non_empty_account_rejected() {
        let (payer, mint) = (key(1), key(9));
        let mut ledger = funded(payer, 500);
        ledger.open_token_account(&payer, &payer, &mint, 0).unwrap();
        ledger.mint(&payer, &Asset::Token(mint), 1).unwrap();
        assert!(matches!(
            ledger.close_token_account(&payer, &mint, &payer),
            Err(LedgerError::AccountNotEmpty { balance: 1, .. })
        ));
    }

    #[test]
    fn mint_overflow_rejected() {
        let a = key(1);
        let mut ledger = funded(a, u64::MAX);
        assert!(matches!(
            ledger.mint(&a, &Asset::Native, 1),
            Err(LedgerError::Overflow { .. })
        ));
        assert_eq!(ledger.balance(&a, &Asset::Native), u64::MAX);
    }

    #[test]
    fn burn_reduces_balance() {
        let a = key(1);
        let mut ledger = funded(a, 100);
        ledger.burn(&a, &Asset::Native, 30).unwrap();
        assert_eq!(ledger.balance(&a, &Asset::Native), 70);
        assert!(ledger.burn(&a, &Asset::Native, 71).is_err());
    }

    #[test]
    fn token_accounts_listed_by_mint() {
        let (payer, m1, m2) = (key(1), key(8), key(9));
        let mut ledger = funded(payer, 1_000);
        ledger.open_token_account(&payer, &payer, &m2, 10).unwrap();
        ledger.open_token_account(&payer, &payer, &m1, 10).unwrap();
        let mints: Vec<_> = ledger.token_accounts(&payer).iter().map(|v| v.mint).collect();
        assert_eq!(mints, vec![m1, m2]);
    }

    #[test]
    fn snapshot_serialization_roundtrip() {
        let (a, mint) = (key(1), key(9));
        let mut ledger = funded(a, 1_000);
        ledger.open_token_account(&a, &a, &mint, 10).unwrap();
        ledger.mint(&a, &Asset::Token(mint), 7).unwrap();

        let json = serde_json::to_string(&ledger).expect("serialize");
        let recovered: InMemoryLedger = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, ledger);
    }
}
