//! # Vault State Machine
//!
//! [`Vault`] owns the registry, the escrow directory, the delegation book,
//! and the asset ledger, and is the only way any of them change.
//!
//! ## Applying transitions
//!
//! ```text
//!   Transition { steps } ──▶ checkpoint ──▶ step 0 ──▶ step 1 ──▶ ... ──▶ StateDelta
//!                               ▲              │          │
//!                               └── restore ◀──┴──────────┘  (any error)
//! ```
//!
//! Each step is dispatched in order against the live state. If any step
//! fails, the whole vault is restored from the checkpoint taken before the
//! first step, so a rejected transition leaves no trace.
//!
//! Registry and escrow lifecycle handlers live here; custody, delegation,
//! and token-account handlers live in [`crate::custody`].

use serde::{Deserialize, Serialize};

use autovault_protocol::config::VaultParams;
use autovault_protocol::crypto::derivation::ProgramAddress;
use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::identity::SignerSet;
use autovault_protocol::ledger::{Asset, AssetLedger, InMemoryLedger};

use crate::command::{Command, Transition};
use crate::delegation::DelegationBook;
use crate::delta::{Effect, StateDelta};
use crate::error::VaultError;
use crate::escrow::{derive_escrow_address, Escrow, EscrowDirectory, EscrowStatus};
use crate::policy::{authorize, PolicyContext, Requirement};
use crate::registry::{derive_registry_address, Registry};

/// The complete custody state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault<L = InMemoryLedger> {
    pub(crate) params: VaultParams,
    pub(crate) registry: Option<Registry>,
    pub(crate) escrows: EscrowDirectory,
    pub(crate) delegations: DelegationBook,
    pub(crate) ledger: L,
}

impl<L: AssetLedger + Clone> Vault<L> {
    /// A vault with no registry and no escrows, backed by `ledger`.
    pub fn new(params: VaultParams, ledger: L) -> Self {
        Self {
            params,
            registry: None,
            escrows: EscrowDirectory::new(),
            delegations: DelegationBook::new(),
            ledger,
        }
    }

    pub fn params(&self) -> &VaultParams {
        &self.params
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.registry.as_ref()
    }

    pub fn escrows(&self) -> &EscrowDirectory {
        &self.escrows
    }

    pub fn delegations(&self) -> &DelegationBook {
        &self.delegations
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for fixtures (minting test balances). Custody
    /// movements must go through [`Vault::apply`].
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Where `owner`'s escrow lives, whether or not it exists yet.
    pub fn escrow_address(&self, owner: &PublicKey) -> Result<ProgramAddress, VaultError> {
        Ok(derive_escrow_address(&self.params.program_id, owner)?)
    }

    /// `owner`'s escrow record, active or closed.
    pub fn escrow_of(&self, owner: &PublicKey) -> Result<Option<&Escrow>, VaultError> {
        let derived = self.escrow_address(owner)?;
        Ok(self.escrows.get(&derived.address))
    }

    pub fn escrow_status(&self, owner: &PublicKey) -> Result<EscrowStatus, VaultError> {
        let derived = self.escrow_address(owner)?;
        Ok(self.escrows.status(&derived.address))
    }

    /// Balance of `asset` held in `owner`'s escrow.
    pub fn escrow_balance(&self, owner: &PublicKey, asset: &Asset) -> Result<u64, VaultError> {
        let derived = self.escrow_address(owner)?;
        Ok(self.ledger.balance(&derived.address, asset))
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Apply every step of `transition` under `signers`, all or nothing.
    pub fn apply(
        &mut self,
        transition: &Transition,
        signers: &SignerSet,
    ) -> Result<StateDelta, VaultError> {
        if transition.is_empty() {
            return Err(VaultError::EmptyTransition);
        }

        let checkpoint = self.clone();
        let mut delta = StateDelta::new();

        for (index, step) in transition.steps.iter().enumerate() {
            match self.dispatch(step, signers) {
                Ok(effects) => delta.extend(effects),
                Err(err) => {
                    *self = checkpoint;
                    tracing::warn!(
                        step = index,
                        op = step.name(),
                        error = %err,
                        "transition rejected, state restored"
                    );
                    return Err(err);
                }
            }
        }

        tracing::info!(
            steps = transition.steps.len(),
            effects = delta.len(),
            "transition committed"
        );
        Ok(delta)
    }

    /// Apply a single command.
    pub fn execute(&mut self, command: Command, signers: &SignerSet) -> Result<StateDelta, VaultError> {
        self.apply(&Transition::single(command), signers)
    }

    /// Route `command` to its handler. The requirement comes from
    /// [`Command::requirement`], so the table there is what gets enforced.
    fn dispatch(&mut self, command: &Command, signers: &SignerSet) -> Result<Vec<Effect>, VaultError> {
        tracing::debug!(op = command.name(), "dispatching");
        let requirement = command.requirement();
        let req = &requirement;
        match command {
            Command::InitializeRegistry { caller } => self.initialize_registry(signers, req, caller),
            Command::UpdateAdmin { caller, new_admin } => {
                self.authorize_registry(signers, req)?;
                self.registry_mut()?
                    .update_admin(signers, caller, *new_admin)
            }
            Command::UpdateOperator {
                caller,
                operator,
                enable,
            } => {
                self.authorize_registry(signers, req)?;
                let limit = self.params.max_operators;
                self.registry_mut()?
                    .update_operator(signers, caller, *operator, *enable, limit)
            }
            Command::InitializeEscrow { payer, owner } => {
                self.initialize_escrow(signers, req, payer, owner)
            }
            Command::CloseEscrow { owner, destination } => {
                self.close_escrow(signers, req, owner, destination)
            }
            Command::TransferNative { owner, to, amount } => {
                self.transfer_native(signers, req, owner, to, *amount)
            }
            Command::TransferToken {
                owner,
                mint,
                to,
                amount,
            } => self.transfer_token(signers, req, owner, mint, to, *amount),
            Command::TransferTokenByOperator {
                operator,
                owner,
                mint,
                to,
                amount,
            } => self.transfer_token_by_operator(signers, req, operator, owner, mint, to, *amount),
            Command::WithdrawToken { owner, mint } => self.withdraw_token(signers, req, owner, mint),
            Command::WithdrawTokenByOperator {
                operator,
                owner,
                mint,
                destination,
            } => self.withdraw_token_by_operator(signers, req, operator, owner, mint, destination),
            Command::ApproveDelegate {
                owner,
                mint,
                delegate,
                amount,
            } => self.approve_delegate(signers, req, owner, mint, delegate, *amount),
            Command::RevokeDelegate { owner, mint } => self.revoke_delegate(signers, req, owner, mint),
            Command::CloseTokenAccount {
                owner,
                mint,
                destination,
            } => self.close_token_account(signers, req, owner, mint, destination),
            Command::OpenTokenAccount {
                payer,
                holder,
                mint,
            } => self.open_token_account(signers, req, payer, holder, mint),
            Command::TransferAsDelegate {
                delegate,
                owner,
                mint,
                to,
                amount,
            } => self.transfer_as_delegate(signers, req, delegate, owner, mint, to, *amount),
        }
    }

    /// Fails with `AlreadyClosed` when `holder` is a closed escrow. Value
    /// credited there could never leave again.
    pub(crate) fn ensure_not_closed(&self, holder: &PublicKey) -> Result<(), VaultError> {
        match self.escrows.get(holder) {
            Some(escrow) if !escrow.is_active() => {
                Err(VaultError::AlreadyClosed { address: *holder })
            }
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    fn registry_mut(&mut self) -> Result<&mut Registry, VaultError> {
        self.registry.as_mut().ok_or(VaultError::RegistryNotFound)
    }

    fn authorize_registry(&self, signers: &SignerSet, requirement: &Requirement) -> Result<(), VaultError> {
        authorize(
            requirement,
            signers,
            &PolicyContext::new().with_registry(self.registry.as_ref()),
        )
    }

    fn initialize_registry(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        caller: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        authorize(requirement, signers, &PolicyContext::new())?;

        if let Some(existing) = &self.registry {
            tracing::debug!(admin = %existing.admin(), "registry already initialized");
            return Ok(Vec::new());
        }

        let derived = derive_registry_address(&self.params.program_id)?;
        self.registry = Some(Registry::new(derived, *caller));
        tracing::info!(address = %derived.address, admin = %caller, "registry initialized");

        Ok(vec![Effect::RegistryInitialized {
            address: derived.address,
            admin: *caller,
        }])
    }

    // -----------------------------------------------------------------------
    // Escrow lifecycle
    // -----------------------------------------------------------------------

    fn initialize_escrow(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        payer: &PublicKey,
        owner: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        authorize(requirement, signers, &PolicyContext::new())?;

        let derived = self.escrow_address(owner)?;
        match self.escrows.get(&derived.address) {
            Some(escrow) if escrow.is_active() => {
                tracing::debug!(%owner, address = %derived.address, "escrow already active");
                return Ok(Vec::new());
            }
            Some(_) => {
                return Err(VaultError::AlreadyClosed {
                    address: derived.address,
                })
            }
            None => {}
        }

        let reserve = self.params.escrow_reserve;
        if reserve > 0 {
            self.ledger
                .transfer(payer, &derived.address, &Asset::Native, reserve)?;
        }
        self.escrows.insert(Escrow::open(*owner, derived, reserve));
        tracing::info!(%owner, address = %derived.address, bump = derived.bump, "escrow created");

        Ok(vec![Effect::EscrowCreated {
            owner: *owner,
            address: derived.address,
            bump: derived.bump,
            reserve,
        }])
    }

    fn close_escrow(
        &mut self,
        signers: &SignerSet,
        requirement: &Requirement,
        owner: &PublicKey,
        destination: &PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        let escrow = self.escrows.active(&self.params.program_id, owner)?.clone();
        authorize(
            requirement,
            signers,
            &PolicyContext::new()
                .with_registry(self.registry.as_ref())
                .with_escrow(&escrow),
        )?;
        self.ensure_not_closed(destination)?;

        let address = *escrow.address();
        let native = self.ledger.balance(&address, &Asset::Native);
        let spendable = escrow.spendable(native);
        if spendable > 0 {
            return Err(VaultError::NotEmpty {
                holder: address,
                asset: Asset::Native,
                balance: spendable,
            });
        }

        let accounts = self.ledger.token_accounts(&address);
        if let Some(held) = accounts.iter().find(|view| view.amount > 0) {
            return Err(VaultError::NotEmpty {
                holder: address,
                asset: Asset::Token(held.mint),
                balance: held.amount,
            });
        }

        let mut effects = Vec::new();
        for view in &accounts {
            let reclaimed = self
                .ledger
                .close_token_account(&address, &view.mint, destination)?;
            effects.push(Effect::TokenAccountClosed {
                holder: address,
                mint: view.mint,
                destination: *destination,
                reclaimed,
            });
        }

        if native > 0 {
            self.ledger
                .transfer(&address, destination, &Asset::Native, native)?;
        }

        for (mint, delegation) in self.delegations.clear_escrow(&address) {
            effects.push(Effect::DelegateRevoked {
                escrow: address,
                mint,
                delegate: delegation.delegate,
            });
        }

        if let Some(record) = self.escrows.get_mut(&address) {
            record.mark_closed();
        }
        tracing::info!(%owner, %address, %destination, reclaimed = native, "escrow closed");

        effects.push(Effect::EscrowClosed {
            owner: *owner,
            address,
            destination: *destination,
            reclaimed: native,
        });
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autovault_protocol::crypto::keys::Keypair;

    fn key() -> PublicKey {
        Keypair::generate().public_key()
    }

    fn signed(ids: &[PublicKey]) -> SignerSet {
        SignerSet::from_verified(ids.iter().copied())
    }

    fn funded_vault(payer: PublicKey) -> Vault {
        let mut vault = Vault::new(VaultParams::default(), InMemoryLedger::new());
        vault
            .ledger_mut()
            .mint(&payer, &Asset::Native, 10_000_000)
            .unwrap();
        vault
    }

    #[test]
    fn initialize_registry_is_idempotent() {
        let admin = key();
        let mut vault = funded_vault(admin);

        let first = vault
            .execute(Command::InitializeRegistry { caller: admin }, &signed(&[admin]))
            .unwrap();
        assert_eq!(first.len(), 1);

        let before = vault.clone();
        let second = vault
            .execute(Command::InitializeRegistry { caller: admin }, &signed(&[admin]))
            .unwrap();
        assert!(second.is_noop());
        assert_eq!(vault, before);
    }

    #[test]
    fn second_initializer_does_not_take_over() {
        let admin = key();
        let other = key();
        let mut vault = funded_vault(admin);
        vault
            .execute(Command::InitializeRegistry { caller: admin }, &signed(&[admin]))
            .unwrap();
        vault
            .execute(Command::InitializeRegistry { caller: other }, &signed(&[other]))
            .unwrap();
        assert_eq!(vault.registry().unwrap().admin(), &admin);
        assert!(!vault.registry().unwrap().is_operator(&other));
    }

    #[test]
    fn role_updates_need_a_registry() {
        let admin = key();
        let mut vault = funded_vault(admin);
        let err = vault
            .execute(
                Command::UpdateAdmin {
                    caller: admin,
                    new_admin: key(),
                },
                &signed(&[admin]),
            )
            .unwrap_err();
        assert_eq!(err, VaultError::RegistryNotFound);
    }

    #[test]
    fn initialize_escrow_charges_reserve_once() {
        let payer = key();
        let owner = key();
        let mut vault = funded_vault(payer);
        let reserve = vault.params().escrow_reserve;

        let cmd = Command::InitializeEscrow { payer, owner };
        vault.execute(cmd.clone(), &signed(&[payer])).unwrap();
        assert!(vault.execute(cmd, &signed(&[payer])).unwrap().is_noop());

        assert_eq!(vault.escrow_status(&owner).unwrap(), EscrowStatus::Active);
        assert_eq!(vault.escrow_balance(&owner, &Asset::Native).unwrap(), reserve);
        assert_eq!(
            vault.ledger().balance(&payer, &Asset::Native),
            10_000_000 - reserve
        );
        let escrow = vault.escrow_of(&owner).unwrap().unwrap();
        assert_eq!(escrow.owner(), &owner);
        assert!(escrow.verify_derivation(&vault.params().program_id));
    }

    #[test]
    fn initialize_escrow_requires_payer_signature() {
        let payer = key();
        let owner = key();
        let mut vault = funded_vault(payer);
        let err = vault
            .execute(Command::InitializeEscrow { payer, owner }, &signed(&[owner]))
            .unwrap_err();
        assert_eq!(err, VaultError::unauthorized(Requirement::SignerOnly(payer)));
        assert_eq!(vault.escrow_status(&owner).unwrap(), EscrowStatus::Uninitialized);
    }

    #[test]
    fn unfunded_payer_cannot_create_escrow() {
        let payer = key();
        let owner = key();
        let mut vault = Vault::new(VaultParams::default(), InMemoryLedger::new());
        let err = vault
            .execute(Command::InitializeEscrow { payer, owner }, &signed(&[payer]))
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientFunds { .. }));
        assert!(vault.escrows().is_empty());
    }

    #[test]
    fn close_escrow_returns_reserve_and_is_terminal() {
        let owner = key();
        let dest = key();
        let mut vault = funded_vault(owner);
        vault
            .execute(Command::InitializeEscrow { payer: owner, owner }, &signed(&[owner]))
            .unwrap();
        let reserve = vault.params().escrow_reserve;

        let close = Command::CloseEscrow {
            owner,
            destination: dest,
        };
        vault.execute(close.clone(), &signed(&[owner])).unwrap();
        assert_eq!(vault.escrow_status(&owner).unwrap(), EscrowStatus::Closed);
        assert_eq!(vault.ledger().balance(&dest, &Asset::Native), reserve);

        let address = vault.escrow_address(&owner).unwrap().address;
        assert_eq!(
            vault.execute(close, &signed(&[owner])).unwrap_err(),
            VaultError::AlreadyClosed { address }
        );
        assert_eq!(
            vault
                .execute(Command::InitializeEscrow { payer: owner, owner }, &signed(&[owner]))
                .unwrap_err(),
            VaultError::AlreadyClosed { address }
        );
    }

    #[test]
    fn close_escrow_with_spendable_native_rejected() {
        let owner = key();
        let mut vault = funded_vault(owner);
        vault
            .execute(Command::InitializeEscrow { payer: owner, owner }, &signed(&[owner]))
            .unwrap();
        let address = vault.escrow_address(&owner).unwrap().address;
        vault.ledger_mut().mint(&address, &Asset::Native, 5).unwrap();

        let err = vault
            .execute(
                Command::CloseEscrow {
                    owner,
                    destination: owner,
                },
                &signed(&[owner]),
            )
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::NotEmpty {
                holder: address,
                asset: Asset::Native,
                balance: 5
            }
        );
        assert_eq!(vault.escrow_status(&owner).unwrap(), EscrowStatus::Active);
    }

    #[test]
    fn failed_step_rolls_back_earlier_steps() {
        let admin = key();
        let owner = key();
        let mut vault = funded_vault(admin);
        let before = vault.clone();

        let transition = Transition::new(vec![
            Command::InitializeRegistry { caller: admin },
            Command::InitializeEscrow {
                payer: admin,
                owner,
            },
            // Owner did not sign.
            Command::CloseEscrow {
                owner,
                destination: admin,
            },
        ]);
        assert!(vault.apply(&transition, &signed(&[admin])).is_err());
        assert_eq!(vault, before);
    }

    #[test]
    fn empty_transition_rejected() {
        let mut vault = funded_vault(key());
        assert_eq!(
            vault.apply(&Transition::default(), &SignerSet::new()).unwrap_err(),
            VaultError::EmptyTransition
        );
    }

    #[test]
    fn vault_snapshot_roundtrips_through_json() {
        let admin = key();
        let mut vault = funded_vault(admin);
        vault
            .execute(Command::InitializeRegistry { caller: admin }, &signed(&[admin]))
            .unwrap();
        vault
            .execute(
                Command::InitializeEscrow {
                    payer: admin,
                    owner: admin,
                },
                &signed(&[admin]),
            )
            .unwrap();

        let json = serde_json::to_string(&vault).unwrap();
        let restored: Vault = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, vault);
    }
}
