//! # Authorization Policy Engine
//!
//! Every vault operation names exactly one [`Requirement`]. A requirement
//! is a pure predicate over the transition's verified [`SignerSet`] and the
//! records the operation touches; nothing here reads balances or mutates
//! state.
//!
//! | Requirement        | Satisfied when the signer set contains...         |
//! |--------------------|---------------------------------------------------|
//! | `AdminOnly`        | the registry admin                                |
//! | `OwnerOnly`        | the escrow's owner                                |
//! | `OperatorOnly`     | at least one registry operator                    |
//! | `OwnerOrOperator`  | the escrow's owner, or at least one operator      |
//! | `DelegateOnly`     | the delegate recorded for the escrow and mint     |
//! | `SignerOnly(id)`   | `id` itself (payers, fee sources)                 |
//!
//! Requirements that consult the registry fail with
//! [`VaultError::RegistryNotFound`] when no registry exists, so a caller can
//! tell "not allowed" apart from "not set up yet".

use serde::{Deserialize, Serialize};
use std::fmt;

use autovault_protocol::crypto::keys::PublicKey;
use autovault_protocol::identity::SignerSet;

use crate::delegation::Delegation;
use crate::error::VaultError;
use crate::escrow::Escrow;
use crate::registry::Registry;

/// An authorization predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    AdminOnly,
    OwnerOnly,
    OperatorOnly,
    OwnerOrOperator,
    DelegateOnly,
    SignerOnly(PublicKey),
}

impl Requirement {
    /// Whether evaluating this requirement needs the registry.
    pub fn needs_registry(&self) -> bool {
        matches!(
            self,
            Requirement::AdminOnly | Requirement::OperatorOnly | Requirement::OwnerOrOperator
        )
    }

    /// Evaluate the predicate. Missing context evaluates to `false`.
    pub fn is_satisfied(&self, signers: &SignerSet, ctx: &PolicyContext<'_>) -> bool {
        match self {
            Requirement::AdminOnly => ctx
                .registry
                .map_or(false, |registry| signers.contains(registry.admin())),
            Requirement::OwnerOnly => ctx
                .escrow
                .map_or(false, |escrow| signers.contains(escrow.owner())),
            Requirement::OperatorOnly => ctx
                .registry
                .map_or(false, |registry| signers.intersects(registry.operators())),
            Requirement::OwnerOrOperator => {
                Requirement::OwnerOnly.is_satisfied(signers, ctx)
                    || Requirement::OperatorOnly.is_satisfied(signers, ctx)
            }
            Requirement::DelegateOnly => ctx
                .delegation
                .map_or(false, |delegation| signers.contains(&delegation.delegate)),
            Requirement::SignerOnly(identity) => signers.contains(identity),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::AdminOnly => write!(f, "admin signature"),
            Requirement::OwnerOnly => write!(f, "escrow owner signature"),
            Requirement::OperatorOnly => write!(f, "operator signature"),
            Requirement::OwnerOrOperator => write!(f, "escrow owner or operator signature"),
            Requirement::DelegateOnly => write!(f, "approved delegate signature"),
            Requirement::SignerOnly(identity) => write!(f, "signature from {}", identity),
        }
    }
}

/// The records a requirement is evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext<'a> {
    pub registry: Option<&'a Registry>,
    pub escrow: Option<&'a Escrow>,
    pub delegation: Option<&'a Delegation>,
}

impl<'a> PolicyContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, registry: Option<&'a Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_escrow(mut self, escrow: &'a Escrow) -> Self {
        self.escrow = Some(escrow);
        self
    }

    pub fn with_delegation(mut self, delegation: Option<&'a Delegation>) -> Self {
        self.delegation = delegation;
        self
    }
}

/// Evaluate `requirement` and turn a refusal into an error.
pub fn authorize(
    requirement: &Requirement,
    signers: &SignerSet,
    ctx: &PolicyContext<'_>,
) -> Result<(), VaultError> {
    if requirement.needs_registry() && ctx.registry.is_none() {
        return Err(VaultError::RegistryNotFound);
    }

    let granted = requirement.is_satisfied(signers, ctx);
    tracing::debug!(
        requirement = %requirement,
        signers = signers.len(),
        granted,
        "policy evaluated"
    );

    if granted {
        Ok(())
    } else {
        Err(VaultError::unauthorized(requirement.clone()))
    }
}
