//! Locating Apple Mail's on-disk stores.
//!
//! Mail keeps its metadata index at
//! `~/Library/Mail/V<n>/MailData/Envelope Index` and the message bodies as
//! `.emlx` files under per-mailbox `Messages/` directories. The version
//! directory moved across macOS releases (V9 Monterey, V10 Ventura,
//! V11 Sonoma, ...), so discovery globs for `V*` and prefers the highest
//! version present. Reads of this tree fail with `PermissionDenied` unless
//! the process has Full Disk Access; those failures are mapped to an error
//! that says so.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::DiscoveryError;

/// Fallback version directory when none can be detected from the path.
const DEFAULT_VERSION_DIRECTORY: &str = "V10";

/// Resolved location of an Envelope Index and its surrounding layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeIndexInfo {
    /// The `Envelope Index` SQLite file.
    pub envelope_index_path: PathBuf,
    /// Version directory name, e.g. `V10`.
    pub version_directory: String,
    /// The `Mail` directory holding the version directories.
    pub mail_base_path: PathBuf,
    /// The `MailData` directory containing the index.
    pub mail_data_path: PathBuf,
}

fn version_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^V\d+$").expect("valid regex"))
}

fn map_io_error(path: &Path, err: std::io::Error) -> DiscoveryError {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        DiscoveryError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        DiscoveryError::EnvelopeIndexNotFound {
            path: path.to_path_buf(),
        }
    }
}

/// Locate the Envelope Index.
///
/// With an explicit path the file is validated as-is; otherwise
/// `~/Library/Mail` is globbed for `V*/MailData/Envelope Index` and the
/// highest version directory wins.
pub fn discover(explicit: Option<&Path>) -> Result<EnvelopeIndexInfo, DiscoveryError> {
    let index_path = match explicit {
        Some(path) => {
            match path.try_exists() {
                Ok(true) => {}
                Ok(false) => {
                    return Err(DiscoveryError::EnvelopeIndexNotFound {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) => return Err(map_io_error(path, err)),
            }
            path.to_path_buf()
        }
        None => default_envelope_index_path()?,
    };

    let info = describe_index_path(&index_path);
    log::debug!(
        "using Envelope Index at {} (version directory {})",
        info.envelope_index_path.display(),
        info.version_directory
    );
    Ok(info)
}

fn default_envelope_index_path() -> Result<PathBuf, DiscoveryError> {
    let home = dirs::home_dir().ok_or_else(|| DiscoveryError::MailDirectoryNotFound {
        path: PathBuf::from("~"),
    })?;
    let mail_dir = home.join("Library/Mail");
    match mail_dir.try_exists() {
        Ok(true) => {}
        Ok(false) => {
            return Err(DiscoveryError::MailDirectoryNotFound { path: mail_dir });
        }
        Err(err) => return Err(map_io_error(&mail_dir, err)),
    }

    let pattern = mail_dir.join("V*/MailData/Envelope Index");
    let pattern = pattern.to_string_lossy().to_string();
    let mut matches: Vec<PathBuf> = Vec::new();
    let entries = glob::glob(&pattern).map_err(|_| DiscoveryError::MailDirectoryNotFound {
        path: mail_dir.clone(),
    })?;
    for entry in entries {
        match entry {
            Ok(path) => matches.push(path),
            Err(err) if err.error().kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(DiscoveryError::PermissionDenied {
                    path: err.path().to_path_buf(),
                });
            }
            Err(_) => {}
        }
    }

    if matches.is_empty() {
        return Err(DiscoveryError::NoVersionDirectory { path: mail_dir });
    }

    // Sorted ascending; the highest version directory comes last.
    matches.sort();
    Ok(matches.pop().expect("non-empty"))
}

/// Derive the layout record for a known index path. The version directory is
/// read from the nearest `V<n>` ancestor component, defaulting to
/// [`DEFAULT_VERSION_DIRECTORY`] when the path has none.
fn describe_index_path(index_path: &Path) -> EnvelopeIndexInfo {
    let mut version_directory = None;
    let mut mail_base_path = None;

    for ancestor in index_path.ancestors().skip(1) {
        if let Some(name) = ancestor.file_name().and_then(|n| n.to_str()) {
            if version_dir_re().is_match(name) {
                version_directory = Some(name.to_string());
                mail_base_path = ancestor.parent().map(Path::to_path_buf);
                break;
            }
        }
    }

    let mail_data_path = index_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    EnvelopeIndexInfo {
        envelope_index_path: index_path.to_path_buf(),
        version_directory: version_directory
            .unwrap_or_else(|| DEFAULT_VERSION_DIRECTORY.to_string()),
        mail_base_path: mail_base_path
            .unwrap_or_else(|| mail_data_path.parent().map(Path::to_path_buf).unwrap_or_default()),
        mail_data_path,
    }
}

/// Resolve the `.emlx` file for a message.
///
/// Bodies live at `<mailbox>/Messages/<rowid>.emlx`; a relative mailbox path
/// is anchored at `mail_base_path`.
pub fn emlx_path(message_rowid: i64, mailbox_path: &Path, mail_base_path: &Path) -> PathBuf {
    let mailbox = if mailbox_path.is_absolute() {
        mailbox_path.to_path_buf()
    } else {
        mail_base_path.join(mailbox_path)
    };
    mailbox.join("Messages").join(format!("{}.emlx", message_rowid))
}
