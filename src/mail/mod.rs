//! The canonical mail database.
//!
//! Owns the vault's mail schema (messages, mailboxes, addresses, threads,
//! the thread junction table, FTS, and sync bookkeeping) plus the
//! attach-and-bulk-copy pipeline that projects Apple's Envelope Index into
//! it. The projection SQL and the column converters live in [`envelope`];
//! schema and query operations live in [`database`].

pub mod database;
pub mod envelope;

pub use database::{MailDatabase, ThreadSortBy};
pub use envelope::{
    EnvelopeMessageStatus, SELECT_INBOX_ONLY_QUERY, SELECT_WITH_JOINS_QUERY, convert_bool,
    convert_date, exists_query, extract_account_id, extract_mailbox_name, format_sender,
    parse_sender, select_by_id_query, select_message_mailbox_query, status_query,
};
