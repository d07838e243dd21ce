// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # AutoVault Node
//!
//! Entry point for the `autovault-node` binary. Parses CLI arguments,
//! initializes logging, and runs one subcommand against a data directory:
//!
//! - `init`    — create params, an empty vault snapshot, and an admin key
//! - `keygen`  — generate a keypair
//! - `derive`  — compute an owner's escrow address and bump
//! - `sign`    — attach a signature to a transition file
//! - `apply`   — verify and commit a signed transition
//! - `fund`    — devnet fixture: mint balances
//! - `show`    — dump state
//! - `version` — print build version information
//!
//! Logs go to stderr; results are printed to stdout as JSON.

mod cli;
mod logging;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::Path;

use autovault_contracts::{SignedTransition, Transition};
use autovault_protocol::config::VaultParams;
use autovault_protocol::crypto::keys::{Keypair, PublicKey};
use autovault_protocol::ledger::{Asset, AssetLedger};

use cli::{AutoVaultCli, Commands};
use logging::LogFormat;
use store::Store;

fn main() -> Result<()> {
    let cli = AutoVaultCli::parse();
    logging::init_logging(&cli.log, LogFormat::from_str_lossy(&cli.log_format));

    let store = Store::new(&cli.data_dir);
    match cli.command {
        Commands::Init(args) => init_vault(&store, args),
        Commands::Keygen(args) => keygen(args),
        Commands::Derive(args) => derive(&store, args),
        Commands::Sign(args) => sign_transition(args),
        Commands::Apply(args) => apply_transition(&store, args),
        Commands::Fund(args) => fund(&store, args),
        Commands::Show(args) => show(&store, args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Prints `value` to stdout as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_identity(label: &str, text: &str) -> Result<PublicKey> {
    PublicKey::parse(text).with_context(|| format!("invalid {} identity: {}", label, text))
}

/// Initializes a data directory and generates the admin keypair.
fn init_vault(store: &Store, args: cli::InitArgs) -> Result<()> {
    let params = match &args.params {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read params from {}", path.display()))?;
            VaultParams::from_json(&json)
                .with_context(|| format!("invalid params in {}", path.display()))?
        }
        None => VaultParams::default(),
    };

    tracing::info!(data_dir = %store.dir().display(), program_id = %params.program_id, "initializing vault");
    store.init(&params, args.force)?;

    let admin = Keypair::generate();
    let key_path = store.admin_key_path();
    // `store.init` already refused to clobber an existing vault without --force.
    store::write_key(&key_path, &admin, true)?;
    tracing::info!(
        public_key = %admin.public_key(),
        key_path = %key_path.display(),
        "admin keypair generated"
    );

    println!("Vault initialized successfully.");
    println!("  Data directory : {}", store.dir().display());
    println!("  Program id     : {}", params.program_id);
    println!("  Admin key      : {}", key_path.display());
    println!("  Admin identity : {}", admin.public_key());
    Ok(())
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = Keypair::generate();
    store::write_key(&args.out, &keypair, args.force)?;
    tracing::info!(key_path = %args.out.display(), "keypair generated");
    println!("{}", keypair.public_key());
    Ok(())
}

#[derive(Serialize)]
struct DerivedEscrow {
    owner: PublicKey,
    address: PublicKey,
    bump: u8,
    status: autovault_contracts::EscrowStatus,
}

fn derive(store: &Store, args: cli::DeriveArgs) -> Result<()> {
    let owner = parse_identity("owner", &args.owner)?;
    let params = store.load_params()?;
    let derived = autovault_contracts::derive_escrow_address(&params.program_id, &owner)?;

    // Status is best-effort: `derive` works without an initialized vault.
    let status = match store.load() {
        Ok(vault) => vault.escrows().status(&derived.address),
        Err(_) => autovault_contracts::EscrowStatus::Uninitialized,
    };

    print_json(&DerivedEscrow {
        owner,
        address: derived.address,
        bump: derived.bump,
        status,
    })
}

/// Reads a transition file that is either bare or already signed.
fn read_transition(path: &Path) -> Result<SignedTransition> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read transition from {}", path.display()))?;
    if let Ok(signed) = serde_json::from_str::<SignedTransition>(&json) {
        return Ok(signed);
    }
    let bare: Transition = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a transition", path.display()))?;
    Ok(SignedTransition::new(bare))
}

fn sign_transition(args: cli::SignArgs) -> Result<()> {
    let keypair = store::read_key(&args.key)?;
    let mut signed = read_transition(&args.transition)?;
    signed.sign(&keypair)?;

    let out = args.out.as_deref().unwrap_or(&args.transition);
    let json = serde_json::to_string_pretty(&signed)?;
    store::write_atomic(out, json.as_bytes())?;

    tracing::info!(
        signer = %keypair.public_key(),
        signatures = signed.attestations.len(),
        path = %out.display(),
        "transition signed"
    );
    Ok(())
}

fn apply_transition(store: &Store, args: cli::ApplyArgs) -> Result<()> {
    let signed = read_transition(&args.transition)?;
    let signers = signed
        .verify()
        .context("transition signatures did not verify")?;

    let lock = store.lock()?;
    let mut vault = store.load()?;
    let delta = vault
        .apply(&signed.transition, &signers)
        .context("transition rejected")?;
    store.save(&lock, &vault)?;

    print_json(&delta)
}

fn fund(store: &Store, args: cli::FundArgs) -> Result<()> {
    let holder = parse_identity("holder", &args.holder)?;
    let lock = store.lock()?;
    let mut vault = store.load()?;

    let asset = match &args.mint {
        Some(mint) => {
            let mint = parse_identity("mint", mint)?;
            // Devnet fixture: open the account reserve-free if it is missing.
            if !vault.ledger().has_token_account(&holder, &mint) {
                vault
                    .ledger_mut()
                    .open_token_account(&holder, &holder, &mint, 0)?;
                tracing::warn!(%holder, %mint, "opened token account without reserve for funding");
            }
            Asset::Token(mint)
        }
        None => Asset::Native,
    };

    vault.ledger_mut().mint(&holder, &asset, args.amount)?;
    store.save(&lock, &vault)?;
    tracing::info!(%holder, %asset, amount = args.amount, "funded");

    println!("{}", vault.ledger().balance(&holder, &asset));
    Ok(())
}

#[derive(Serialize)]
struct EscrowReport<'a> {
    escrow: &'a autovault_contracts::Escrow,
    native: u64,
    spendable_native: u64,
    tokens: Vec<TokenReport>,
}

#[derive(Serialize)]
struct TokenReport {
    mint: PublicKey,
    amount: u64,
    delegate: Option<PublicKey>,
    allowance: Option<u64>,
}

fn show(store: &Store, args: cli::ShowArgs) -> Result<()> {
    let vault = store.load()?;

    let Some(owner) = args.owner else {
        return print_json(&vault);
    };

    let owner = parse_identity("owner", &owner)?;
    let escrow = vault
        .escrow_of(&owner)?
        .with_context(|| format!("no escrow for owner {}", owner))?;
    let address = escrow.address();
    let native = vault.ledger().balance(address, &Asset::Native);

    let tokens = vault
        .ledger()
        .token_accounts(address)
        .into_iter()
        .map(|view| {
            let delegation = vault.delegations().get(address, &view.mint);
            TokenReport {
                mint: view.mint,
                amount: view.amount,
                delegate: delegation.map(|d| d.delegate),
                allowance: delegation.map(|d| d.allowance),
            }
        })
        .collect();

    print_json(&EscrowReport {
        escrow,
        native,
        spendable_native: escrow.spendable(native),
        tokens,
    })
}

/// Prints version information to stdout.
fn print_version() {
    println!("autovault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", autovault_protocol::config::PROTOCOL_VERSION);
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
