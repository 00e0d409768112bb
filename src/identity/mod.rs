//! Stable identifier derivation.
//!
//! Everything stored in the vault is keyed by a deterministic 32-character
//! lowercase hex id derived from the record's strongest available natural
//! key, so re-running a sync maps each logical message or event onto the
//! same row. The hash is SHA-256 truncated to 128 bits; salted prefixes keep
//! the id spaces for messages, threads, and mailboxes disjoint.

mod calendar;
mod message;

pub use calendar::{
    EventIdentity, IdentityResolution, content_matches, generate_public_id, is_external_id,
    reconcile_identity,
};
pub use message::{
    generate_message_id, is_valid_id, mailbox_id_for_url, normalize_message_id, random_id,
    stable_hash_hex,
};
