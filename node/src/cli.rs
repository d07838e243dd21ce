//! # CLI Interface
//!
//! Defines the command-line argument structure for `autovault-node` using
//! `clap` derive. Global flags select the data directory and logging; each
//! subcommand does one thing against that directory and exits.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default `EnvFilter` directive when neither `--log` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_DIRECTIVE: &str =
    "autovault_node=info,autovault_contracts=info,autovault_protocol=warn";

/// AutoVault custody host.
///
/// Keeps a vault snapshot in a data directory, verifies signed transitions
/// against it, and commits them all-or-nothing.
#[derive(Parser, Debug)]
#[command(
    name = "autovault-node",
    about = "AutoVault custody host",
    version,
    propagate_version = true
)]
pub struct AutoVaultCli {
    /// Data directory holding `params.json`, `state.json`, and keys.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = "AUTOVAULT_DATA_DIR",
        default_value = ".autovault"
    )]
    pub data_dir: PathBuf,

    /// Log filter directive (`RUST_LOG` takes precedence when set).
    #[arg(long, global = true, env = "AUTOVAULT_LOG", default_value = DEFAULT_LOG_DIRECTIVE)]
    pub log: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "AUTOVAULT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory with params, an empty vault, and an admin key.
    Init(InitArgs),
    /// Generate a fresh Ed25519 keypair.
    Keygen(KeygenArgs),
    /// Print the escrow address and bump for an owner.
    Derive(DeriveArgs),
    /// Add a signature to a transition file.
    Sign(SignArgs),
    /// Verify and apply a signed transition, printing the resulting delta.
    Apply(ApplyArgs),
    /// Devnet fixture: mint native or token units to a holder.
    Fund(FundArgs),
    /// Dump vault state, or one owner's escrow.
    Show(ShowArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Params file to copy into the data directory. Defaults apply when omitted.
    #[arg(long, short = 'p')]
    pub params: Option<PathBuf>,

    /// Overwrite an existing vault snapshot.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `keygen` subcommand.
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Where to write the hex-encoded secret key.
    #[arg(long, short = 'o')]
    pub out: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `derive` subcommand.
#[derive(Args, Debug)]
pub struct DeriveArgs {
    /// Owner identity (base58 or hex).
    pub owner: String,
}

/// Arguments for the `sign` subcommand.
#[derive(Args, Debug)]
pub struct SignArgs {
    /// Transition file: a bare transition or one already carrying signatures.
    pub transition: PathBuf,

    /// Secret key file to sign with.
    #[arg(long, short = 'k')]
    pub key: PathBuf,

    /// Output path. Defaults to rewriting the input in place.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

/// Arguments for the `apply` subcommand.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Signed transition file.
    pub transition: PathBuf,
}

/// Arguments for the `fund` subcommand.
#[derive(Args, Debug)]
pub struct FundArgs {
    /// Holder identity (base58 or hex).
    pub holder: String,

    /// Amount in smallest units.
    pub amount: u64,

    /// Token mint. Native units are minted when omitted.
    #[arg(long, short = 'm')]
    pub mint: Option<String>,
}

/// Arguments for the `show` subcommand.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Only show this owner's escrow.
    #[arg(long)]
    pub owner: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        AutoVaultCli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = AutoVaultCli::try_parse_from([
            "autovault-node",
            "apply",
            "tx.json",
            "--data-dir",
            "/tmp/vault",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/vault"));
        assert_eq!(cli.log_format, "json");
        assert!(matches!(cli.command, Commands::Apply(ref a) if a.transition == PathBuf::from("tx.json")));
    }

    #[test]
    fn fund_parses_optional_mint() {
        let cli = AutoVaultCli::try_parse_from(["autovault-node", "fund", "abc", "1000", "--mint", "xyz"])
            .unwrap();
        match cli.command {
            Commands::Fund(args) => {
                assert_eq!(args.amount, 1000);
                assert_eq!(args.mint.as_deref(), Some("xyz"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn keygen_force_defaults_off() {
        let cli = AutoVaultCli::try_parse_from(["autovault-node", "keygen", "--out", "op.key"]).unwrap();
        assert!(matches!(cli.command, Commands::Keygen(ref a) if !a.force));

        let cli =
            AutoVaultCli::try_parse_from(["autovault-node", "keygen", "--out", "op.key", "--force"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Keygen(ref a) if a.force));
    }

    #[test]
    fn sign_requires_key() {
        assert!(AutoVaultCli::try_parse_from(["autovault-node", "sign", "tx.json"]).is_err());
    }
}
