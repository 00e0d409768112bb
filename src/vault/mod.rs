//! Vault layout, config, and account bindings.
//!
//! A vault is a user-chosen directory holding a hidden `.swiftea/` subtree
//! (config and database) and a visible `Swiftea/` content tree with one
//! canonical folder per data domain. A global registry outside any vault
//! records which account belongs to which vault, enforcing account→vault
//! exclusivity.

mod manager;
mod registry;

pub use manager::{
    CANONICAL_FOLDERS, CONFIG_FILE, CONTENT_DIR, DB_FILE, VAULT_DIR, VaultContext, calendar_dir,
    config_path, content_dir, find_vault_root, initialize_vault, is_vault, mail_dir, read_config,
    vault_db_path, write_config,
};
pub use registry::BindingRegistry;
