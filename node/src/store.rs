//! # Data Directory
//!
//! ```text
//! <data_dir>/
//!   params.json   VaultParams used when the vault was created
//!   state.json    the full vault snapshot (registry, escrows, ledger)
//!   admin.key     hex secret key generated by `init`
//!   .lock         present while a process is mutating state.json
//! ```
//!
//! Snapshots are written to a uniquely named temporary sibling file and
//! renamed into place, so a crash mid-write leaves the previous snapshot
//! intact.
//!
//! Every read-modify-write of the snapshot happens under a [`StoreLock`]:
//! [`Store::save`] requires one, and callers take it before [`Store::load`]
//! so two overlapping runs cannot both start from the same snapshot.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use autovault_contracts::Vault;
use autovault_protocol::config::VaultParams;
use autovault_protocol::crypto::keys::Keypair;
use autovault_protocol::ledger::InMemoryLedger;

pub const PARAMS_FILE: &str = "params.json";
pub const STATE_FILE: &str = "state.json";
pub const ADMIN_KEY_FILE: &str = "admin.key";
pub const LOCK_FILE: &str = ".lock";

/// Exclusive hold on a data directory. Released (and the lock file
/// removed) on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    _file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release store lock");
        }
    }
}

/// A vault data directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.join(PARAMS_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn admin_key_path(&self) -> PathBuf {
        self.dir.join(ADMIN_KEY_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Take the exclusive lock on this directory. Fails immediately if
    /// another process holds it.
    pub fn lock(&self) -> Result<StoreLock> {
        let path = self.lock_path();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => bail!(
                "vault at {} is locked by another process (remove {} if none is running)",
                self.dir.display(),
                path.display()
            ),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create lock file {}", path.display()))
            }
        };
        // Holder's pid, for whoever has to clear a stale lock.
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("failed to write lock file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "store locked");
        Ok(StoreLock { path, _file: file })
    }

    /// Create the directory, write `params`, and persist an empty vault.
    pub fn init(&self, params: &VaultParams, force: bool) -> Result<Vault> {
        params.validate().context("refusing to initialize with invalid params")?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create data directory: {}", self.dir.display()))?;

        let lock = self.lock()?;
        if self.state_path().exists() && !force {
            bail!(
                "vault already initialized at {} (use --force to overwrite)",
                self.dir.display()
            );
        }

        let json = serde_json::to_string_pretty(params)?;
        write_atomic(&self.params_path(), json.as_bytes())?;

        let vault = Vault::new(params.clone(), InMemoryLedger::new());
        self.save(&lock, &vault)?;
        Ok(vault)
    }

    /// Read `params.json`, falling back to defaults when it is absent.
    pub fn load_params(&self) -> Result<VaultParams> {
        let path = self.params_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no params file, using defaults");
            return Ok(VaultParams::default());
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        VaultParams::from_json(&json).with_context(|| format!("invalid params in {}", path.display()))
    }

    /// Load the vault snapshot.
    pub fn load(&self) -> Result<Vault> {
        let path = self.state_path();
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "failed to read {} (run `autovault-node init` first)",
                path.display()
            )
        })?;
        let vault: Vault = serde_json::from_str(&json)
            .with_context(|| format!("corrupt vault snapshot at {}", path.display()))?;

        let params = self.load_params()?;
        if &params != vault.params() {
            tracing::warn!(
                path = %self.params_path().display(),
                "params file differs from the snapshot; snapshot params stay in effect"
            );
        }
        Ok(vault)
    }

    /// Persist `vault` atomically. The caller must hold this store's lock.
    pub fn save(&self, _lock: &StoreLock, vault: &Vault) -> Result<()> {
        let json = serde_json::to_vec_pretty(vault)?;
        write_atomic(&self.state_path(), &json)?;
        tracing::debug!(path = %self.state_path().display(), bytes = json.len(), "snapshot written");
        Ok(())
    }
}

/// Write `bytes` to `path` via a unique temporary file in the same
/// directory, then rename it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to move temp file into place at {}", path.display()))?;
    Ok(())
}

/// Write a keypair's hex secret, readable only by the current user.
/// Refuses to replace an existing key file unless `overwrite` is set.
pub fn write_key(path: &Path, keypair: &Keypair, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!(
            "key file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, keypair.to_hex())
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Read a hex secret key written by [`write_key`].
pub fn read_key(path: &Path) -> Result<Keypair> {
    let hex = fs::read_to_string(path)
        .with_context(|| format!("failed to read key from {}", path.display()))?;
    Keypair::from_hex(hex.trim()).with_context(|| format!("invalid key in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autovault_contracts::Command;
    use autovault_protocol::identity::SignerSet;
    use autovault_protocol::ledger::{Asset, AssetLedger};

    #[test]
    fn init_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("vault"));
        let created = store.init(&VaultParams::default(), false).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(store.load_params().unwrap(), VaultParams::default());
    }

    #[test]
    fn init_refuses_to_clobber_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.init(&VaultParams::default(), false).unwrap();
        assert!(store.init(&VaultParams::default(), false).is_err());
        assert!(store.init(&VaultParams::default(), true).is_ok());
    }

    #[test]
    fn init_rejects_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let params = VaultParams {
            max_operators: 0,
            ..VaultParams::default()
        };
        assert!(store.init(&params, false).is_err());
        assert!(!store.state_path().exists());
    }

    #[test]
    fn saved_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let mut vault = store.init(&VaultParams::default(), false).unwrap();

        let admin = Keypair::generate().public_key();
        vault.ledger_mut().mint(&admin, &Asset::Native, 10_000_000).unwrap();
        vault
            .execute(
                Command::InitializeRegistry { caller: admin },
                &SignerSet::from_verified([admin]),
            )
            .unwrap();
        store.save(&store.lock().unwrap(), &vault).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.registry().unwrap().admin(), &admin);
        assert_eq!(loaded.ledger().balance(&admin, &Asset::Native), 10_000_000);

        // No temp files or lock left behind.
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![PARAMS_FILE.to_string(), STATE_FILE.to_string()]);
    }

    #[test]
    fn second_writer_is_refused_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let vault = store.init(&VaultParams::default(), false).unwrap();

        let held = store.lock().unwrap();
        assert!(store.lock_path().exists());

        // Another handle on the same directory, as a concurrent process would have.
        let other = Store::new(dir.path());
        let err = other.lock().unwrap_err();
        assert!(err.to_string().contains("locked by another process"));
        assert!(other.init(&VaultParams::default(), true).is_err());

        store.save(&held, &vault).unwrap();
        drop(held);
        assert!(!store.lock_path().exists());

        let relocked = other.lock().unwrap();
        other.save(&relocked, &vault).unwrap();
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transition.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn load_without_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Store::new(dir.path()).load().is_err());
    }

    #[test]
    fn key_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("op.key");
        let keypair = Keypair::generate();
        write_key(&path, &keypair, false).unwrap();
        assert_eq!(read_key(&path).unwrap().public_key(), keypair.public_key());
    }

    #[test]
    fn existing_key_is_not_overwritten_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("op.key");
        let original = Keypair::generate();
        write_key(&path, &original, false).unwrap();

        assert!(write_key(&path, &Keypair::generate(), false).is_err());
        assert_eq!(read_key(&path).unwrap().public_key(), original.public_key());

        let replacement = Keypair::generate();
        write_key(&path, &replacement, true).unwrap();
        assert_eq!(read_key(&path).unwrap().public_key(), replacement.public_key());
    }
}
