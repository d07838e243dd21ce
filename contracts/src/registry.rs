//! # Identity & Role Registry
//!
//! A singleton record at the address derived from `["globalState"]`. It
//! names one admin and a bounded set of operators. The registry is created
//! once by whoever calls `initialize_registry` first; that caller becomes
//! admin and the first operator.
//!
//! Only the admin may change either role. Adding an operator that is
//! already present, or removing one that is absent, succeeds without
//! effect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use autovault_protocol::config::REGISTRY_SEED;
use autovault_protocol::crypto::derivation::{find_program_address, DerivationError, ProgramAddress};
use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::identity::SignerSet;

use crate::delta::Effect;
use crate::error::VaultError;
use crate::policy::{authorize, PolicyContext, Requirement};

/// Derive the registry's address under `program_id`.
pub fn derive_registry_address(program_id: &PublicKey) -> Result<ProgramAddress, DerivationError> {
    find_program_address(&[REGISTRY_SEED], program_id)
}

/// The admin and operator roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    address: PublicKey,
    bump: u8,
    admin: PublicKey,
    operators: BTreeSet<PublicKey>,
    updated_at: DateTime<Utc>,
}

impl Registry {
    /// A fresh registry with `admin` as both admin and sole operator.
    pub fn new(derived: ProgramAddress, admin: PublicKey) -> Self {
        Self {
            address: derived.address,
            bump: derived.bump,
            admin,
            operators: BTreeSet::from([admin]),
            updated_at: Utc::now(),
        }
    }

    pub fn address(&self) -> &PublicKey {
        &self.address
    }

    pub fn bump(&self) -> u8 {
        self.bump
    }

    pub fn admin(&self) -> &PublicKey {
        &self.admin
    }

    pub fn operators(&self) -> &BTreeSet<PublicKey> {
        &self.operators
    }

    pub fn is_operator(&self, identity: &PublicKey) -> bool {
        self.operators.contains(identity)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Require that `caller` is the admin and signed.
    pub fn ensure_admin(&self, signers: &SignerSet, caller: &PublicKey) -> Result<(), VaultError> {
        authorize(
            &Requirement::AdminOnly,
            signers,
            &PolicyContext::new().with_registry(Some(self)),
        )?;
        if caller != &self.admin {
            return Err(VaultError::unauthorized(Requirement::AdminOnly));
        }
        Ok(())
    }

    /// Require that `operator` is a registered operator and signed.
    pub fn ensure_operator(&self, signers: &SignerSet, operator: &PublicKey) -> Result<(), VaultError> {
        authorize(
            &Requirement::OperatorOnly,
            signers,
            &PolicyContext::new().with_registry(Some(self)),
        )?;
        if !self.is_operator(operator) || !signers.contains(operator) {
            return Err(VaultError::unauthorized(Requirement::OperatorOnly));
        }
        Ok(())
    }

    /// Replace the admin. The previous admin keeps any operator membership.
    pub fn update_admin(
        &mut self,
        signers: &SignerSet,
        caller: &PublicKey,
        new_admin: PublicKey,
    ) -> Result<Vec<Effect>, VaultError> {
        self.ensure_admin(signers, caller)?;

        if new_admin == self.admin {
            return Ok(Vec::new());
        }

        let previous = std::mem::replace(&mut self.admin, new_admin);
        self.updated_at = Utc::now();
        tracing::info!(%previous, current = %new_admin, "admin rotated");

        Ok(vec![Effect::AdminChanged {
            previous,
            current: new_admin,
        }])
    }

    /// Add (`enable = true`) or remove (`enable = false`) an operator.
    pub fn update_operator(
        &mut self,
        signers: &SignerSet,
        caller: &PublicKey,
        operator: PublicKey,
        enable: bool,
        max_operators: usize,
    ) -> Result<Vec<Effect>, VaultError> {
        self.ensure_admin(signers, caller)?;

        if enable {
            if self.operators.contains(&operator) {
                return Ok(Vec::new());
            }
            if self.operators.len() >= max_operators {
                tracing::warn!(%operator, limit = max_operators, "operator set full");
                return Err(VaultError::OperatorLimitReached {
                    limit: max_operators,
                });
            }
            self.operators.insert(operator);
            self.updated_at = Utc::now();
            tracing::info!(%operator, "operator added");
            Ok(vec![Effect::OperatorAdded { operator }])
        } else {
            if !self.operators.remove(&operator) {
                return Ok(Vec::new());
            }
            self.updated_at = Utc::now();
            tracing::info!(%operator, "operator removed");
            Ok(vec![Effect::OperatorRemoved { operator }])
        }
    }
}
