//! The global account→vault binding registry.
//!
//! One JSON file (outside any vault) records which vault owns each account.
//! Writes go through a temp file in the same directory followed by a rename,
//! so readers observe either the old or the new registry, never a torn one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::NamedTempFile;

use crate::error::BindingError;
use crate::models::AccountBinding;

/// Handle to the registry file. No state is held in memory; every operation
/// reads the file fresh.
#[derive(Debug, Clone)]
pub struct BindingRegistry {
    path: PathBuf,
}

impl BindingRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The registry file this handle reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<AccountBinding>, BindingError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(BindingError::Io {
                    path: self.path.clone(),
                    source: err,
                });
            }
        };

        serde_json::from_str(&raw).map_err(|err| BindingError::RegistryCorrupt {
            detail: err.to_string(),
        })
    }

    fn store(&self, bindings: &[AccountBinding]) -> Result<(), BindingError> {
        let json =
            serde_json::to_string_pretty(bindings).map_err(|err| BindingError::RegistryCorrupt {
                detail: err.to_string(),
            })?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|err| BindingError::Io {
            path: dir.to_path_buf(),
            source: err,
        })?;

        let tmp = NamedTempFile::new_in(dir).map_err(|err| BindingError::Io {
            path: dir.to_path_buf(),
            source: err,
        })?;
        fs::write(tmp.path(), json).map_err(|err| BindingError::Io {
            path: tmp.path().to_path_buf(),
            source: err,
        })?;
        tmp.persist(&self.path).map_err(|err| BindingError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }

    /// Bind `account_id` to `vault_path`.
    ///
    /// Rebinding to the same vault is an idempotent no-op; rebinding to a
    /// different vault fails with `AccountAlreadyBound`.
    pub fn bind_account(
        &self,
        account_id: &str,
        vault_path: &Path,
    ) -> Result<AccountBinding, BindingError> {
        let mut bindings = self.load()?;

        if let Some(existing) = bindings.iter().find(|b| b.account_id == account_id) {
            if Path::new(&existing.vault_path) == vault_path {
                log::debug!(
                    "account {} already bound to {}; nothing to do",
                    account_id,
                    existing.vault_path
                );
                return Ok(existing.clone());
            }
            return Err(BindingError::AccountAlreadyBound {
                account_id: account_id.to_string(),
                existing_vault: PathBuf::from(&existing.vault_path),
            });
        }

        let binding = AccountBinding {
            account_id: account_id.to_string(),
            vault_path: vault_path.display().to_string(),
            bound_at: Utc::now(),
        };
        bindings.push(binding.clone());
        self.store(&bindings)?;

        log::info!("bound account {} to vault {}", account_id, vault_path.display());
        Ok(binding)
    }

    /// Remove the binding for `account_id`. A missing id is a silent no-op.
    pub fn unbind_account(&self, account_id: &str) -> Result<(), BindingError> {
        let mut bindings = self.load()?;
        let before = bindings.len();
        bindings.retain(|b| b.account_id != account_id);
        if bindings.len() != before {
            self.store(&bindings)?;
            log::info!("unbound account {}", account_id);
        }
        Ok(())
    }

    /// The vault `account_id` is bound to, if any.
    pub fn vault_path(&self, account_id: &str) -> Result<Option<PathBuf>, BindingError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|b| b.account_id == account_id)
            .map(|b| PathBuf::from(b.vault_path)))
    }

    /// Whether `account_id` is bound, and to which vault.
    pub fn is_account_bound(&self, account_id: &str) -> Result<(bool, Option<PathBuf>), BindingError> {
        let vault = self.vault_path(account_id)?;
        Ok((vault.is_some(), vault))
    }

    /// All bindings pointing at `vault_path`.
    pub fn bindings_for_vault(&self, vault_path: &Path) -> Result<Vec<AccountBinding>, BindingError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|b| Path::new(&b.vault_path) == vault_path)
            .collect())
    }

    /// Every binding in the registry.
    pub fn all_bindings(&self) -> Result<Vec<AccountBinding>, BindingError> {
        self.load()
    }
}
