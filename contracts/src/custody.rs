//! # Custody Ledger Operations
//!
//! Everything that moves value out of an escrow, plus delegation and token
//! account management. Every handler follows the same order:
//!
//! 1. Locate the escrow (`EscrowNotFound`, `AlreadyClosed`).
//! 2. Authorize against the command's requirement (`Unauthorized`).
//! 3. Check balances and allowances (`InsufficientFunds`, ...).
//! 4. Ask the ledger to move funds, then record effects.
//!
//! A transfer of zero succeeds without touching the ledger. Native
//! transfers can only spend what sits above the escrow's reserve. No
//! recipient or destination may be a closed escrow (`AlreadyClosed`).

use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::identity::SignerSet;
use autovault_protocol::ledger::{Asset, AssetLedger};

use crate::delta::Effect;
use crate::error::VaultError;
use crate::escrow::Escrow;
use crate::policy::{authorize, PolicyContext, Requirement};
use crate::vault::Vault;

impl<L: AssetLedger + Clone> Vault<L> {
    /// The active escrow of `owner`, authorized for `requirement`.
    fn authorized_escrow(
        &self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
    ) -> Result<Escrow, VaultError> {
        let escrow = self.escrows.active(&self.params.program_id, owner)?;
        authorize(
            requirement,
            signers,
            &PolicyContext::new()
                .with_registry(self.registry.as_ref())
                .with_escrow(escrow),
        )?;
        Ok(escrow.clone())
    }

    /// The active escrow of `owner`, for an operator-assisted command
    /// naming `operator`. The named operator must have signed as well.
    fn operator_escrow(
        &self,
        signers: &SignerSet,
        requirement: &Requirement,
        operator: &PublicKey,
        owner: &PublicKey,
    ) -> Result<Escrow, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        let registry = self.registry.as_ref().ok_or(VaultError::RegistryNotFound)?;
        registry.ensure_operator(signers, operator)?;
        Ok(escrow)
    }

    /// Move `amount` of `mint` out of `escrow` to `to`'s token account.
    fn move_token(
        &mut self,
        escrow: &Escrow,
        mint: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        self.ensure_not_closed(to)?;
        let from = *escrow.address();
        if !self.ledger.has_token_account(&from, mint) {
            return Err(VaultError::AccountNotFound {
                holder: from,
                mint: *mint,
            });
        }

        let asset = Asset::Token(*mint);
        let available = self.ledger.balance(&from, &asset);
        if amount > available {
            return Err(VaultError::InsufficientFunds {
                holder: from,
                asset,
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(Vec::new());
        }

        self.ledger.transfer(&from, to, &asset, amount)?;
        tracing::info!(%from, %to, %asset, amount, "token transfer");
        Ok(vec![Effect::Transferred {
            from,
            to: *to,
            asset,
            amount,
        }])
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    pub(crate) fn transfer_native(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        self.ensure_not_closed(to)?;
        let from = *escrow.address();

        let available = escrow.spendable(self.ledger.balance(&from, &Asset::Native));
        if amount > available {
            return Err(VaultError::InsufficientFunds {
                holder: from,
                asset: Asset::Native,
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(Vec::new());
        }

        self.ledger.transfer(&from, to, &Asset::Native, amount)?;
        tracing::info!(%from, %to, amount, "native transfer");
        Ok(vec![Effect::Transferred {
            from,
            to: *to,
            asset: Asset::Native,
            amount,
        }])
    }

    pub(crate) fn transfer_token(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        mint: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        self.move_token(&escrow, mint, to, amount)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn transfer_token_by_operator(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        operator: &PublicKey,
        owner: &PublicKey,
        mint: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.operator_escrow(signers, requirement, operator, owner)?;
        self.move_token(&escrow, mint, to, amount)
    }

    // -----------------------------------------------------------------------
    // Withdrawals
    // -----------------------------------------------------------------------

    /// Sweep the escrow's whole `mint` balance to the owner's token account.
    pub(crate) fn withdraw_token(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        mint: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        let amount = self.ledger.balance(escrow.address(), &Asset::Token(*mint));
        if amount == 0 {
            tracing::debug!(%owner, %mint, "nothing to withdraw");
            return Ok(Vec::new());
        }
        self.move_token(&escrow, mint, owner, amount)
    }

    /// Sweep the escrow's whole `mint` balance to `destination`.
    pub(crate) fn withdraw_token_by_operator(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        operator: &PublicKey,
        owner: &PublicKey,
        mint: &PublicKey,
        destination: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.operator_escrow(signers, requirement, operator, owner)?;
        let amount = self.ledger.balance(escrow.address(), &Asset::Token(*mint));
        if amount == 0 {
            tracing::debug!(%owner, %mint, "nothing to withdraw");
            return Ok(Vec::new());
        }
        self.move_token(&escrow, mint, destination, amount)
    }

    // -----------------------------------------------------------------------
    // Delegation
    // -----------------------------------------------------------------------

    pub(crate) fn approve_delegate(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        mint: &PublicKey,
        delegate: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        let address = *escrow.address();
        if !self.ledger.has_token_account(&address, mint) {
            return Err(VaultError::AccountNotFound {
                holder: address,
                mint: *mint,
            });
        }

        let replaced = self.delegations.approve(address, *mint, *delegate, amount);
        tracing::info!(
            escrow = %address,
            %mint,
            %delegate,
            allowance = amount,
            replaced = replaced.is_some(),
            "delegate approved"
        );

        Ok(vec![Effect::DelegateApproved {
            escrow: address,
            mint: *mint,
            delegate: *delegate,
            allowance: amount,
        }])
    }

    pub(crate) fn revoke_delegate(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        mint: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        let address = *escrow.address();

        match self.delegations.revoke(&address, mint) {
            Some(previous) => {
                tracing::info!(escrow = %address, %mint, delegate = %previous.delegate, "delegate revoked");
                Ok(vec![Effect::DelegateRevoked {
                    escrow: address,
                    mint: *mint,
                    delegate: previous.delegate,
                }])
            }
            None => Ok(Vec::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn transfer_as_delegate(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        delegate: &PublicKey,
        owner: &PublicKey,
        mint: &PublicKey,
        to: &PublicKey,
        amount: u64,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.escrows.active(&self.params.program_id, owner)?.clone();
        let address = *escrow.address();

        let delegation = self.delegations.get(&address, mint).copied();
        let delegation = delegation.filter(|d| &d.delegate == delegate);
        authorize(
            requirement,
            signers,
            &PolicyContext::new().with_delegation(delegation.as_ref()),
        )?;
        let Some(delegation) = delegation else {
            return Err(VaultError::unauthorized(requirement.clone()));
        };

        if amount > delegation.allowance {
            return Err(VaultError::InsufficientAllowance {
                delegate: *delegate,
                mint: *mint,
                allowance: delegation.allowance,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(Vec::new());
        }

        let mut effects = self.move_token(&escrow, mint, to, amount)?;
        let remaining = self.delegations.consume(&address, mint, amount)?;
        effects.push(Effect::AllowanceConsumed {
            escrow: address,
            mint: *mint,
            delegate: *delegate,
            remaining,
        });
        Ok(effects)
    }

    // -----------------------------------------------------------------------
    // Token accounts
    // -----------------------------------------------------------------------

    pub(crate) fn open_token_account(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        payer: &PublicKey,
        holder: &PublicKey,
        mint: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        authorize(requirement, signers, &PolicyContext::new())?;
        self.ensure_not_closed(holder)?;

        let reserve = self.params.token_account_reserve;
        if !self.ledger.open_token_account(payer, holder, mint, reserve)? {
            return Ok(Vec::new());
        }
        tracing::info!(%holder, %mint, %payer, reserve, "token account opened");

        Ok(vec![Effect::TokenAccountOpened {
            holder: *holder,
            mint: *mint,
            payer: *payer,
            reserve,
        }])
    }

    pub(crate) fn close_token_account(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        mint: &PublicKey,
        destination: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.authorized_escrow(signers, requirement, owner)?;
        self.ensure_not_closed(destination)?;
        let address = *escrow.address();

        let balance = self.ledger.balance(&address, &Asset::Token(*mint));
        if balance > 0 {
            return Err(VaultError::NotEmpty {
                holder: address,
                asset: Asset::Token(*mint),
                balance,
            });
        }

        let reclaimed = self.ledger.close_token_account(&address, mint, destination)?;
        tracing::info!(escrow = %address, %mint, %destination, reclaimed, "token account closed");

        let mut effects = vec![Effect::TokenAccountClosed {
            holder: address,
            mint: *mint,
            destination: *destination,
            reclaimed,
        }];
        if let Some(previous) = self.delegations.revoke(&address, mint) {
            effects.push(Effect::DelegateRevoked {
                escrow: address,
                mint: *mint,
                delegate: previous.delegate,
            });
        }
        Ok(effects)
    }
}
