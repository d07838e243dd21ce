//! # Protocol Configuration & Constants
//!
//! Every magic number in AutoVault lives here: derivation seeds, reserve
//! defaults, the operator cap. Seeds in particular are part of every escrow
//! address ever derived; changing one orphans every existing escrow.
//!
//! Runtime-tunable values are grouped in [`VaultParams`], which the host
//! loads from its data directory and hands to the vault at construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::hash::sha256;
use crate::crypto::keys::PublicKey;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Derivation Seeds
// ---------------------------------------------------------------------------

/// Seed prefix for per-owner escrow addresses: `["userVault", owner]`.
pub const ESCROW_SEED: &[u8] = b"userVault";

/// Seed for the singleton registry address: `["globalState"]`.
pub const REGISTRY_SEED: &[u8] = b"globalState";

/// Input hashed to produce the default program id. Devnet only; real
/// deployments set `program_id` explicitly.
pub const DEFAULT_PROGRAM_ID_SEED: &[u8] = b"autovault-program-v1";

/// Domain-separation context for transition signing payloads.
pub const TRANSITION_SIGNING_CONTEXT: &str = "autovault 2026 transition signing v1";

// ---------------------------------------------------------------------------
// Reserves
// ---------------------------------------------------------------------------

/// Native units locked in an escrow for as long as it exists. Sized like
/// the rent-exempt minimum of a small on-chain record.
pub const DEFAULT_ESCROW_RESERVE: u64 = 1_113_600;

/// Native units locked in each token account until it is closed.
pub const DEFAULT_TOKEN_ACCOUNT_RESERVE: u64 = 2_039_280;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Default cap on the operator set. The registry is a fixed-size record;
/// ten keys is plenty for a rotating operator crew.
pub const DEFAULT_MAX_OPERATORS: usize = 10;

// ---------------------------------------------------------------------------
// VaultParams
// ---------------------------------------------------------------------------

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_operators must be at least 1 (the registry starts with its admin as operator)")]
    NoOperatorCapacity,

    #[error("malformed params: {0}")]
    Malformed(String),
}

/// Runtime parameters for a vault instance.
///
/// Every field has a default, so a partial JSON document (or `{}`) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultParams {
    /// Namespace for derived addresses.
    pub program_id: PublicKey,
    /// Native units charged to the payer when an escrow is created.
    pub escrow_reserve: u64,
    /// Native units charged to the payer when a token account is opened.
    pub token_account_reserve: u64,
    /// Maximum size of the operator set.
    pub max_operators: usize,
}

impl Default for VaultParams {
    fn default() -> Self {
        Self {
            program_id: default_program_id(),
            escrow_reserve: DEFAULT_ESCROW_RESERVE,
            token_account_reserve: DEFAULT_TOKEN_ACCOUNT_RESERVE,
            max_operators: DEFAULT_MAX_OPERATORS,
        }
    }
}

impl VaultParams {
    /// Parse and validate params from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Reject configurations the vault cannot operate under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_operators == 0 {
            return Err(ConfigError::NoOperatorCapacity);
        }
        Ok(())
    }
}

/// The devnet program id: `SHA-256(DEFAULT_PROGRAM_ID_SEED)`.
pub fn default_program_id() -> PublicKey {
    PublicKey::from_bytes(sha256(DEFAULT_PROGRAM_ID_SEED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_distinct() {
        assert_ne!(ESCROW_SEED, REGISTRY_SEED);
    }

    #[test]
    fn default_params_are_valid() {
        assert!(VaultParams::default().validate().is_ok());
    }

    #[test]
    fn empty_json_yields_defaults() {
        assert_eq!(VaultParams::from_json("{}").unwrap(), VaultParams::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let params = VaultParams::from_json(r#"{"escrow_reserve": 0, "max_operators": 3}"#).unwrap();
        assert_eq!(params.escrow_reserve, 0);
        assert_eq!(params.max_operators, 3);
        assert_eq!(params.token_account_reserve, DEFAULT_TOKEN_ACCOUNT_RESERVE);
    }

    #[test]
    fn zero_operator_capacity_rejected() {
        assert_eq!(
            VaultParams::from_json(r#"{"max_operators": 0}"#).unwrap_err(),
            ConfigError::NoOperatorCapacity
        );
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            VaultParams::from_json("not json"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn default_program_id_is_stable() {
        assert_eq!(default_program_id(), default_program_id());
    }
}
