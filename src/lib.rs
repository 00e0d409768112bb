//! Core engine of a local-first personal-data vault.
//!
//! Ingests Apple Mail state (the `Envelope Index` SQLite store plus
//! per-message `.emlx` files) and calendar snapshots into a self-contained
//! on-disk vault, and keeps that vault current incrementally.
//!
//! # Pipeline
//!
//! 1. [`discovery`] locates the `Envelope Index` and resolves `.emlx`
//!    paths.
//! 2. [`mail::MailDatabase`] attaches the index and
//!    [bulk-copies](mail::MailDatabase::perform_bulk_copy) its rows into
//!    the canonical schema, deriving stable ids via [`identity`].
//! 3. [`threading`] groups messages into conversations, with an LRU-cached
//!    service in front of thread reads.
//! 4. [`emlx`] parses message bodies and attachments on demand.
//! 5. [`calendar`] mirrors an abstract [`calendar::CalendarSource`] into
//!    its own database.
//!
//! [`vault`] decides where all of this lives and enforces account→vault
//! exclusivity through a global binding registry.

pub mod calendar;
pub mod discovery;
pub mod emlx;
pub mod error;
pub mod identity;
pub mod mail;
pub mod models;
pub mod threading;
pub mod vault;

pub use calendar::CalendarDatabase;
pub use error::{BindingError, DatabaseError, DiscoveryError, EmlxError, VaultError};
pub use mail::MailDatabase;
pub use models::{
    AccountBinding, AccountType, BoundAccount, BulkCopyCounts, MailMessage, MailThread, Mailbox,
    StoredAttendee, StoredCalendar, StoredEvent, VaultConfig,
};
pub use threading::CachedThreadService;
pub use vault::{BindingRegistry, VaultContext};
