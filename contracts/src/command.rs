//! # Commands & Transitions
//!
//! A [`Command`] is one vault operation with its arguments. A
//! [`Transition`] is an ordered list of commands submitted together under
//! a single signer set and applied all-or-nothing.
//!
//! Hosts that receive transitions over the wire wrap them in a
//! [`SignedTransition`]: the signers attest over a domain-separated hash of
//! the transition's canonical JSON, and [`SignedTransition::verify`] turns
//! those attestations into the [`SignerSet`] the policy engine consumes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use autovault_protocol::config::TRANSITION_SIGNING_CONTEXT;
use autovault_protocol::crypto::hash::domain_separated_hash;
use autovault_protocol::crypto::keys::{Keypair, PublicKey};
use autovault_protocol::identity::{verify_attestations, Attestation, SignatureError, SignerSet};

use crate::policy::Requirement;

/// A single vault operation.
///
/// Identity fields name the actor the command runs as (`caller`,
/// `operator`, `owner`, `payer`, `delegate`). Naming an actor grants
/// nothing: the actor must also be in the transition's signer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    InitializeRegistry {
        caller: PublicKey,
    },
    UpdateAdmin {
        caller: PublicKey,
        new_admin: PublicKey,
    },
    UpdateOperator {
        caller: PublicKey,
        operator: PublicKey,
        enable: bool,
    },
    InitializeEscrow {
        payer: PublicKey,
        owner: PublicKey,
    },
    CloseEscrow {
        owner: PublicKey,
        destination: PublicKey,
    },
    TransferNative {
        owner: PublicKey,
        to: PublicKey,
        amount: u64,
    },
    TransferToken {
        owner: PublicKey,
        mint: PublicKey,
        to: PublicKey,
        amount: u64,
    },
    TransferTokenByOperator {
        operator: PublicKey,
        owner: PublicKey,
        mint: PublicKey,
        to: PublicKey,
        amount: u64,
    },
    WithdrawToken {
        owner: PublicKey,
        mint: PublicKey,
    },
    WithdrawTokenByOperator {
        operator: PublicKey,
        owner: PublicKey,
        mint: PublicKey,
        destination: PublicKey,
    },
    ApproveDelegate {
        owner: PublicKey,
        mint: PublicKey,
        delegate: PublicKey,
        amount: u64,
    },
    RevokeDelegate {
        owner: PublicKey,
        mint: PublicKey,
    },
    CloseTokenAccount {
        owner: PublicKey,
        mint: PublicKey,
        destination: PublicKey,
    },
    OpenTokenAccount {
        payer: PublicKey,
        holder: PublicKey,
        mint: PublicKey,
    },
    TransferAsDelegate {
        delegate: PublicKey,
        owner: PublicKey,
        mint: PublicKey,
        to: PublicKey,
        amount: u64,
    },
}

impl Command {
    /// Stable operation name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::InitializeRegistry { .. } => "initialize_registry",
            Command::UpdateAdmin { .. } => "update_admin",
            Command::UpdateOperator { .. } => "update_operator",
            Command::InitializeEscrow { .. } => "initialize_escrow",
            Command::CloseEscrow { .. } => "close_escrow",
            Command::TransferNative { .. } => "transfer_native",
            Command::TransferToken { .. } => "transfer_token",
            Command::TransferTokenByOperator { .. } => "transfer_token_by_operator",
            Command::WithdrawToken { .. } => "withdraw_token",
            Command::WithdrawTokenByOperator { .. } => "withdraw_token_by_operator",
            Command::ApproveDelegate { .. } => "approve_delegate",
            Command::RevokeDelegate { .. } => "revoke_delegate",
            Command::CloseTokenAccount { .. } => "close_token_account",
            Command::OpenTokenAccount { .. } => "open_token_account",
            Command::TransferAsDelegate { .. } => "transfer_as_delegate",
        }
    }

    /// The authorization predicate this command is checked against.
    pub fn requirement(&self) -> Requirement {
        match self {
            Command::InitializeRegistry { caller } => Requirement::SignerOnly(*caller),
            Command::UpdateAdmin { .. } | Command::UpdateOperator { .. } => Requirement::AdminOnly,
            Command::InitializeEscrow { payer, .. } | Command::OpenTokenAccount { payer, .. } => {
                Requirement::SignerOnly(*payer)
            }
            Command::TransferTokenByOperator { .. } | Command::WithdrawTokenByOperator { .. } => {
                Requirement::OperatorOnly
            }
            Command::TransferAsDelegate { .. } => Requirement::DelegateOnly,
            Command::CloseEscrow { .. }
            | Command::TransferNative { .. }
            | Command::TransferToken { .. }
            | Command::WithdrawToken { .. }
            | Command::ApproveDelegate { .. }
            | Command::RevokeDelegate { .. }
            | Command::CloseTokenAccount { .. } => Requirement::OwnerOnly,
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Errors while signing or verifying a transition.
#[derive(Debug, Error)]
pub enum TransitionAuthError {
    #[error("failed to encode transition: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// An ordered batch of commands applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub steps: Vec<Command>,
}

impl Transition {
    pub fn new(steps: Vec<Command>) -> Self {
        Self { steps }
    }

    pub fn single(command: Command) -> Self {
        Self {
            steps: vec![command],
        }
    }

    pub fn push(&mut self, command: Command) {
        self.steps.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The 32-byte message signers attest over.
    pub fn signing_message(&self) -> Result<[u8; 32], serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(domain_separated_hash(TRANSITION_SIGNING_CONTEXT, &canonical))
    }
}

/// A transition plus the attestations authorizing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransition {
    pub transition: Transition,
    #[serde(default)]
    pub attestations: Vec<Attestation>,
}

impl SignedTransition {
    /// Wrap `transition` with no attestations yet.
    pub fn new(transition: Transition) -> Self {
        Self {
            transition,
            attestations: Vec::new(),
        }
    }

    /// Add `keypair`'s attestation. Signing twice with the same key is a
    /// no-op.
    pub fn sign(&mut self, keypair: &Keypair) -> Result<(), TransitionAuthError> {
        let signer = keypair.public_key();
        if self.attestations.iter().any(|a| a.signer == signer) {
            return Ok(());
        }
        let message = self.transition.signing_message()?;
        self.attestations.push(Attestation::sign(keypair, &message));
        Ok(())
    }

    /// Verify every attestation and return the signer set.
    pub fn verify(&self) -> Result<SignerSet, TransitionAuthError> {
        let message = self.transition.signing_message()?;
        Ok(verify_attestations(&message, &self.attestations)?)
    }
}
