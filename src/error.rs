//! Error taxonomy for the vault engine.
//!
//! Every public operation returns a typed failure from one of the domain
//! enums below. Display strings are written to be actionable: they name the
//! path at issue and, where recovery requires a user step (creating a vault,
//! granting disk access), say what that step is.

use std::path::PathBuf;
use thiserror::Error;

/// Failures from vault creation, detection, and config round-trips.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("a vault already exists at {}; pass force to reinitialize it", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("{} is not a vault (no .swiftea/config.json found)", path.display())]
    NotAVault { path: PathBuf },

    #[error(
        "no vault found at or above {}; run `swea init` in the directory that should hold this data",
        path.display()
    )]
    NoVaultContext { path: PathBuf },

    #[error("vault config is invalid: {detail}")]
    ConfigInvalid { detail: String },

    #[error("vault io failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures from the global account binding registry.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("account {account_id} is already bound to vault {}", existing_vault.display())]
    AccountAlreadyBound {
        account_id: String,
        existing_vault: PathBuf,
    },

    #[error("binding registry is corrupt: {detail}")]
    RegistryCorrupt { detail: String },

    #[error("registry io failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while locating Apple Mail's Envelope Index.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mail directory not found at {}", path.display())]
    MailDirectoryNotFound { path: PathBuf },

    #[error("no V* version directory found under {}", path.display())]
    NoVersionDirectory { path: PathBuf },

    #[error("Envelope Index not found at {}", path.display())]
    EnvelopeIndexNotFound { path: PathBuf },

    #[error(
        "cannot read {}: permission denied. Grant Full Disk Access to this process in \
         System Settings > Privacy & Security, then retry",
        path.display()
    )]
    PermissionDenied { path: PathBuf },
}

/// Failures from parsing an emlx file.
#[derive(Debug, Error)]
pub enum EmlxError {
    #[error("emlx file not found at {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("invalid emlx format: {detail}")]
    InvalidFormat { detail: String },

    #[error("failed to decode {section}: {detail}")]
    DecodingError { section: String, detail: String },
}

/// Failures from the mail and calendar databases.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database is not initialized; call initialize first")]
    NotInitialized,

    #[error("an Envelope Index is already attached; detach it before attaching another")]
    AlreadyAttached,

    #[error("no Envelope Index is attached")]
    NotAttached,

    #[error("query failed: {detail}")]
    QueryFailed { detail: String },

    #[error("constraint violation: {detail}")]
    ConstraintViolation { detail: String },
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_foreign_key_violation()
                    || db.is_check_violation() =>
            {
                DatabaseError::ConstraintViolation {
                    detail: db.message().to_string(),
                }
            }
            _ => DatabaseError::QueryFailed {
                detail: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn permission_denied_mentions_full_disk_access() {
        let err = DiscoveryError::PermissionDenied {
            path: Path::new("/Users/u/Library/Mail").to_path_buf(),
        };
        let text = err.to_string();
        assert!(text.contains("Full Disk Access"));
        assert!(text.contains("/Users/u/Library/Mail"));
    }

    #[test]
    fn no_vault_context_mentions_init_command() {
        let err = VaultError::NoVaultContext {
            path: Path::new("/tmp/somewhere").to_path_buf(),
        };
        let text = err.to_string();
        assert!(text.contains("swea init"));
        assert!(text.contains("/tmp/somewhere"));
    }
}
