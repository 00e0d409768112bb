//! Canonical records stored in and returned from the vault databases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of upstream account a vault can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Mail,
    Calendar,
}

/// An account recorded in a vault's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundAccount {
    /// Upstream account identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// Human-friendly display name.
    pub name: String,
}

/// Contents of `.swiftea/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Config format version.
    pub version: String,
    /// Ordered list of accounts owned by this vault.
    pub accounts: Vec<BoundAccount>,
}

/// Current config format version.
pub const CONFIG_VERSION: &str = "1.0";

impl VaultConfig {
    /// A fresh config with no accounts.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            accounts: Vec::new(),
        }
    }

    /// Add an account, replacing any existing entry with the same id.
    pub fn add_account(&mut self, account: BoundAccount) {
        self.accounts.retain(|a| a.id != account.id);
        self.accounts.push(account);
    }

    /// Remove an account by id. Missing ids are a no-op.
    pub fn remove_account(&mut self, id: &str) {
        self.accounts.retain(|a| a.id != id);
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in the global binding registry: an account owned by a vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBinding {
    pub account_id: String,
    pub vault_path: String,
    /// When the binding was created (ISO 8601).
    pub bound_at: DateTime<Utc>,
}

/// A mail message in the canonical schema.
///
/// `id` is the stable 32-hex identifier derived from the message's strongest
/// natural key; it does not change across sync runs for the same logical
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Stable 32-hex identifier.
    pub id: String,
    /// Upstream Envelope Index ROWID, when the message came from a bulk copy.
    pub apple_rowid: Option<i64>,
    /// RFC 5322 Message-ID, angle brackets preserved.
    pub message_id: Option<String>,
    pub mailbox_id: Option<String>,
    pub mailbox_name: Option<String>,
    pub subject: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    /// Unix seconds.
    pub date_received: Option<i64>,
    /// Unix seconds.
    pub date_sent: Option<i64>,
    pub is_read: bool,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub has_attachments: bool,
    /// Conversation this message belongs to, once threaded.
    pub thread_id: Option<String>,
    /// In-Reply-To header token, angle brackets preserved.
    pub in_reply_to: Option<String>,
    /// References header tokens, oldest first.
    pub references: Vec<String>,
    /// First characters of the body, when body extraction has run.
    pub body_preview: Option<String>,
}

impl MailMessage {
    /// A message with the given id and all other fields empty.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            apple_rowid: None,
            message_id: None,
            mailbox_id: None,
            mailbox_name: None,
            subject: None,
            sender_name: None,
            sender_email: None,
            date_received: None,
            date_sent: None,
            is_read: false,
            is_flagged: false,
            is_deleted: false,
            has_attachments: false,
            thread_id: None,
            in_reply_to: None,
            references: Vec::new(),
            body_preview: None,
        }
    }
}

/// A mailbox in the canonical schema, identified by a stable id derived from
/// its upstream url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Mailbox {
    pub id: String,
    pub name: String,
    pub account_id: Option<String>,
}

/// An address row copied from the Envelope Index, empty strings normalized
/// to null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AddressRecord {
    pub rowid: i64,
    pub address: Option<String>,
    pub comment: Option<String>,
}

/// A conversation of messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MailThread {
    /// Stable 32-hex identifier.
    pub id: String,
    /// Normalized subject of the conversation.
    pub subject: Option<String>,
    /// Distinct sender addresses across the thread.
    pub participant_count: i64,
    /// Number of junction rows for the thread.
    pub message_count: i64,
    /// Unix seconds of the earliest message.
    pub first_date: Option<i64>,
    /// Unix seconds of the latest message.
    pub last_date: Option<i64>,
}

/// A calendar stored in the calendar database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredCalendar {
    pub id: String,
    pub eventkit_id: Option<String>,
    pub title: String,
    pub source_type: Option<String>,
    pub color: Option<String>,
    pub is_subscribed: bool,
    pub is_immutable: bool,
    /// Unix seconds of the last sync that touched this calendar.
    pub synced_at: i64,
}

/// An event stored in the calendar database.
///
/// Recurrence masters and their occurrences are stored uniformly: an
/// occurrence carries `master_event_id` and `occurrence_date`, and recurrence
/// rules are kept opaque (no expansion happens in the store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredEvent {
    pub id: String,
    pub eventkit_id: Option<String>,
    pub external_id: Option<String>,
    pub calendar_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    /// Unix seconds.
    pub start_utc: i64,
    /// Unix seconds; always >= `start_utc`.
    pub end_utc: i64,
    pub start_tz: Option<String>,
    pub end_tz: Option<String>,
    pub is_all_day: bool,
    pub recurrence_rule: Option<String>,
    pub master_event_id: Option<String>,
    pub occurrence_date: Option<i64>,
    pub status: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub synced_at: i64,
}

/// An attendee of a stored event. Replaced wholesale per event and
/// cascade-deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredAttendee {
    pub event_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub response_status: Option<String>,
    pub is_organizer: bool,
    pub is_optional: bool,
}

/// Row counts produced by one bulk copy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCopyCounts {
    pub message_count: u64,
    pub mailbox_count: u64,
    pub address_count: u64,
    pub total_count: u64,
}

/// Result of threading a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadingOutcome {
    pub thread_id: String,
    pub is_new_thread: bool,
}

/// Summary of a batch threading pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadingBatchSummary {
    /// Messages successfully linked to a thread.
    pub processed: u64,
    /// Messages skipped because of a per-message failure.
    pub failed: u64,
    /// Threads created during this batch.
    pub new_threads: u64,
}

/// Summary of one `sync_from_source` run against the calendar database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalendarSyncSummary {
    pub calendars: u64,
    pub events_upserted: u64,
    pub events_pruned: u64,
}

/// Cache counters exposed by the cached thread service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatistics {
    pub hit_count: u64,
    pub miss_count: u64,
    /// Entries currently cached.
    pub size: usize,
    /// Percentage of lookups served from cache.
    pub hit_rate: f64,
}
