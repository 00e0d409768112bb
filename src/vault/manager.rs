//! Vault creation, detection, and config round-trips.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::VaultError;
use crate::models::VaultConfig;

/// Hidden directory marking a vault root.
pub const VAULT_DIR: &str = ".swiftea";
/// Config file inside [`VAULT_DIR`].
pub const CONFIG_FILE: &str = "config.json";
/// Canonical mail database inside [`VAULT_DIR`].
pub const DB_FILE: &str = "swiftea.db";
/// Visible content tree at the vault root.
pub const CONTENT_DIR: &str = "Swiftea";
/// Canonical folders created under [`CONTENT_DIR`].
pub const CANONICAL_FOLDERS: [&str; 2] = ["Mail", "Calendar"];

/// Path of `.swiftea/config.json` under `root`.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(VAULT_DIR).join(CONFIG_FILE)
}

/// Path of the canonical mail database under `root`.
pub fn vault_db_path(root: &Path) -> PathBuf {
    root.join(VAULT_DIR).join(DB_FILE)
}

/// Path of the visible content tree under `root`.
pub fn content_dir(root: &Path) -> PathBuf {
    root.join(CONTENT_DIR)
}

/// Canonical mail folder under `root`.
pub fn mail_dir(root: &Path) -> PathBuf {
    content_dir(root).join("Mail")
}

/// Canonical calendar folder under `root`.
pub fn calendar_dir(root: &Path) -> PathBuf {
    content_dir(root).join("Calendar")
}

/// True iff `path` is a vault root (`.swiftea/config.json` exists).
pub fn is_vault(path: &Path) -> bool {
    config_path(path).is_file()
}

fn io_err(path: &Path, source: std::io::Error) -> VaultError {
    VaultError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create a vault at `path`, or re-lay an existing one when `force` is set.
///
/// Creates `.swiftea/` with a default config and an empty `swiftea.db` (no
/// schema yet; the database components apply it on their own initialize), and
/// every canonical folder under `Swiftea/`, plus any `extra_folders`. With
/// `force`, an existing vault's config is rewritten and missing folders are
/// recreated; data files are never deleted.
pub fn initialize_vault(
    path: &Path,
    force: bool,
    extra_folders: &[&str],
) -> Result<VaultConfig, VaultError> {
    let vault_dir = path.join(VAULT_DIR);
    if vault_dir.exists() && !force {
        return Err(VaultError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    fs::create_dir_all(&vault_dir).map_err(|e| io_err(&vault_dir, e))?;

    let config = VaultConfig::new();
    write_config(path, &config)?;

    // Touch the database file without truncating an existing one.
    let db_path = vault_db_path(path);
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(&db_path)
        .map_err(|e| io_err(&db_path, e))?;

    for folder in CANONICAL_FOLDERS.iter().copied().chain(extra_folders.iter().copied()) {
        let dir = content_dir(path).join(folder);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    log::info!("initialized vault at {}", path.display());
    Ok(config)
}

/// Load and validate `.swiftea/config.json` under `root`.
pub fn read_config(root: &Path) -> Result<VaultConfig, VaultError> {
    let path = config_path(root);
    let raw = fs::read_to_string(&path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => VaultError::NotAVault {
            path: root.to_path_buf(),
        },
        _ => io_err(&path, err),
    })?;

    serde_json::from_str(&raw).map_err(|err| VaultError::ConfigInvalid {
        detail: err.to_string(),
    })
}

/// Write `.swiftea/config.json` under `root`, pretty-printed with stable
/// key order.
pub fn write_config(root: &Path, config: &VaultConfig) -> Result<(), VaultError> {
    let path = config_path(root);
    let json = serde_json::to_string_pretty(config).map_err(|err| VaultError::ConfigInvalid {
        detail: err.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| io_err(&path, e))
}

/// Walk `from` and its ancestors, returning the first vault root found.
///
/// The starting path is resolved through symlinks first so every caller
/// standardizes on the same root for the same vault.
pub fn find_vault_root(from: &Path) -> Option<PathBuf> {
    let start = fs::canonicalize(from).unwrap_or_else(|_| from.to_path_buf());
    let mut current: Option<&Path> = Some(start.as_path());
    while let Some(dir) = current {
        if is_vault(dir) {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// A resolved vault: its root directory and loaded config.
#[derive(Debug, Clone)]
pub struct VaultContext {
    pub root: PathBuf,
    pub config: VaultConfig,
}

impl VaultContext {
    /// Resolve the vault owning `at`, failing with a `NoVaultContext` error
    /// (which tells the user to run `swea init`) when no ancestor is a
    /// vault.
    pub fn require(at: &Path) -> Result<Self, VaultError> {
        let root = find_vault_root(at).ok_or_else(|| VaultError::NoVaultContext {
            path: at.to_path_buf(),
        })?;
        let config = read_config(&root)?;
        Ok(Self { root, config })
    }

    /// The canonical mail database path for this vault.
    pub fn db_path(&self) -> PathBuf {
        vault_db_path(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn initialize_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let config = initialize_vault(root, false, &[]).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.accounts.is_empty());

        assert!(is_vault(root));
        assert!(vault_db_path(root).is_file());
        assert!(mail_dir(root).is_dir());
        assert!(calendar_dir(root).is_dir());
    }

    #[test]
    fn initialize_twice_requires_force() {
        let tmp = TempDir::new().unwrap();
        initialize_vault(tmp.path(), false, &[]).unwrap();

        let err = initialize_vault(tmp.path(), false, &[]).unwrap_err();
        assert!(matches!(err, VaultError::AlreadyExists { .. }));

        // Force re-lays the vault without deleting the database file.
        std::fs::write(vault_db_path(tmp.path()), b"data").unwrap();
        initialize_vault(tmp.path(), true, &[]).unwrap();
        assert_eq!(std::fs::read(vault_db_path(tmp.path())).unwrap(), b"data");
    }

    #[test]
    fn config_round_trip_is_stable() {
        let tmp = TempDir::new().unwrap();
        initialize_vault(tmp.path(), false, &[]).unwrap();

        let mut config = read_config(tmp.path()).unwrap();
        config.add_account(crate::models::BoundAccount {
            id: "acc-1".into(),
            account_type: crate::models::AccountType::Mail,
            name: "Work".into(),
        });
        write_config(tmp.path(), &config).unwrap();

        let reread = read_config(tmp.path()).unwrap();
        assert_eq!(reread, config);

        let first = std::fs::read_to_string(config_path(tmp.path())).unwrap();
        write_config(tmp.path(), &reread).unwrap();
        let second = std::fs::read_to_string(config_path(tmp.path())).unwrap();
        assert_eq!(first, second, "serialization is byte-stable");
    }

    #[test]
    fn find_vault_root_walks_ancestors() {
        let tmp = TempDir::new().unwrap();
        initialize_vault(tmp.path(), false, &[]).unwrap();
        let nested = tmp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_vault_root(&nested).unwrap();
        assert_eq!(root, std::fs::canonicalize(tmp.path()).unwrap());

        let outside = TempDir::new().unwrap();
        assert!(find_vault_root(outside.path()).is_none());
    }

    #[test]
    fn require_reports_searched_path() {
        let tmp = TempDir::new().unwrap();
        let err = VaultContext::require(tmp.path()).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("swea init"));
        assert!(text.contains(&tmp.path().display().to_string()));
    }

    #[test]
    fn corrupt_config_is_config_invalid() {
        let tmp = TempDir::new().unwrap();
        initialize_vault(tmp.path(), false, &[]).unwrap();
        std::fs::write(config_path(tmp.path()), "{not json").unwrap();

        let err = read_config(tmp.path()).unwrap_err();
        assert!(matches!(err, VaultError::ConfigInvalid { .. }));
    }
}
