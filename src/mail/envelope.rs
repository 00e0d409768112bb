//! Envelope Index attach and bulk-copy projection.
//!
//! Apple's `Envelope Index` is attached read-only under the logical name
//! `envelope`, then three projection passes copy addresses, mailboxes, and
//! messages into the canonical schema inside one write transaction. The
//! upstream schema is normalized: `messages.subject` and `messages.sender`
//! are ROWID references into `subjects` and `addresses`, and `mailboxes.url`
//! encodes both the account and the mailbox name.
//!
//! The whole pipeline is idempotent: ids derive from natural keys, so
//! re-running it against the same upstream produces identical rows. Local
//! state (`is_deleted`, `thread_id`) survives re-ingestion because the
//! message upsert merges rather than replacing wholesale.

use std::path::Path;

use sqlx::{Connection, Row};

use super::database::MailDatabase;
use crate::error::DatabaseError;
use crate::identity::{generate_message_id, mailbox_id_for_url};
use crate::models::BulkCopyCounts;

/// Projection of upstream message rows with subject, sender, and mailbox
/// joined in. Ends without a WHERE clause so callers can append one.
pub const SELECT_WITH_JOINS_QUERY: &str = "\
SELECT m.ROWID AS rowid,
       s.subject AS subject,
       a.address AS sender_email,
       a.comment AS sender_name,
       m.date_received AS date_received,
       m.date_sent AS date_sent,
       m.message_id AS message_id,
       mb.url AS mailbox_url,
       m.read AS is_read,
       m.flagged AS is_flagged
FROM envelope.messages m
LEFT JOIN envelope.subjects s ON m.subject = s.ROWID
LEFT JOIN envelope.addresses a ON m.sender = a.ROWID
LEFT JOIN envelope.mailboxes mb ON m.mailbox = mb.ROWID";

/// Same projection restricted to inbox mailboxes.
pub const SELECT_INBOX_ONLY_QUERY: &str = "\
SELECT m.ROWID AS rowid,
       s.subject AS subject,
       a.address AS sender_email,
       a.comment AS sender_name,
       m.date_received AS date_received,
       m.date_sent AS date_sent,
       m.message_id AS message_id,
       mb.url AS mailbox_url,
       m.read AS is_read,
       m.flagged AS is_flagged
FROM envelope.messages m
LEFT JOIN envelope.subjects s ON m.subject = s.ROWID
LEFT JOIN envelope.addresses a ON m.sender = a.ROWID
INNER JOIN envelope.mailboxes mb ON m.mailbox = mb.ROWID
WHERE mb.url LIKE '%/inbox'";

fn rowid_list(row_ids: &[i64]) -> String {
    row_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Which of the given upstream ROWIDs still exist.
pub fn exists_query(row_ids: &[i64]) -> String {
    format!(
        "SELECT ROWID FROM envelope.messages WHERE ROWID IN ({})",
        rowid_list(row_ids)
    )
}

/// Read/flagged status for the given upstream ROWIDs.
pub fn status_query(row_ids: &[i64]) -> String {
    format!(
        "SELECT ROWID AS rowid, read AS is_read, flagged AS is_flagged \
         FROM envelope.messages WHERE ROWID IN ({})",
        rowid_list(row_ids)
    )
}

/// Full projection of a single upstream message.
pub fn select_by_id_query(id: i64) -> String {
    format!("{} WHERE m.ROWID = {}", SELECT_WITH_JOINS_QUERY, id)
}

/// Mailbox url for each of the given upstream ROWIDs.
pub fn select_message_mailbox_query(row_ids: &[i64]) -> String {
    format!(
        "SELECT m.ROWID AS rowid, mb.url AS mailbox_url \
         FROM envelope.messages m \
         INNER JOIN envelope.mailboxes mb ON m.mailbox = mb.ROWID \
         WHERE m.ROWID IN ({})",
        rowid_list(row_ids)
    )
}

/// Floor an upstream REAL timestamp to integer Unix seconds.
pub fn convert_date(raw: f64) -> i64 {
    raw.floor() as i64
}

/// Upstream boolean columns store 0/1 integers.
pub fn convert_bool(raw: i64) -> bool {
    raw == 1
}

/// Last path segment of a mailbox url, for both
/// `mailbox://account/Name` and `/abs/path/Name.mbox` forms.
pub fn extract_mailbox_name(url: &str) -> Option<String> {
    let trimmed = url.trim_end_matches('/');
    let segment = trimmed.rsplit('/').next()?;
    let name = segment.trim_end_matches(".mbox");
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Host segment of a `mailbox://host/name` url; `None` for filesystem urls.
pub fn extract_account_id(url: &str) -> Option<String> {
    let rest = url.strip_prefix("mailbox://")?;
    let host = rest.split('/').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// Render a sender for display: `"Name" <email>` when both parts exist.
pub fn format_sender(email: Option<&str>, name: Option<&str>) -> Option<String> {
    let email = email.filter(|e| !e.is_empty())?;
    match name.filter(|n| !n.is_empty()) {
        Some(name) => Some(format!("\"{}\" <{}>", name, email)),
        None => Some(email.to_string()),
    }
}

/// Inverse of [`format_sender`]; accepts quoted and unquoted display names.
/// Returns `(name, email)`.
pub fn parse_sender(raw: &str) -> (Option<String>, Option<String>) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return (None, None);
    }

    if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
        if open < close {
            let email = trimmed[open + 1..close].trim();
            let name = trimmed[..open].trim().trim_matches('"').trim();
            let name = if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
            let email = if email.is_empty() {
                None
            } else {
                Some(email.to_string())
            };
            return (name, email);
        }
    }

    (None, Some(trimmed.to_string()))
}

/// Read/flagged status of an upstream message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeMessageStatus {
    pub rowid: i64,
    pub is_read: bool,
    pub is_flagged: bool,
}

impl MailDatabase {
    /// Attach an Envelope Index read-only under the `envelope` schema name.
    ///
    /// `ATTACH` is scoped to one SQLite connection, so the attach slot takes
    /// a dedicated connection from the pool and holds it until
    /// [`detach_envelope_index`](Self::detach_envelope_index).
    pub async fn attach_envelope_index(&mut self, path: &Path) -> Result<(), DatabaseError> {
        if self.attach.is_some() {
            return Err(DatabaseError::AlreadyAttached);
        }
        let pool = self.pool()?;
        if !path.exists() {
            return Err(DatabaseError::QueryFailed {
                detail: format!("Envelope Index does not exist at {}", path.display()),
            });
        }

        let mut conn = pool.acquire().await?;
        let uri = format!("file:{}?mode=ro", path.display());
        sqlx::query("ATTACH DATABASE ?1 AS envelope")
            .bind(&uri)
            .execute(&mut *conn)
            .await?;

        log::info!("attached Envelope Index from {}", path.display());
        self.attach = Some(conn);
        Ok(())
    }

    /// Release the attached Envelope Index.
    pub async fn detach_envelope_index(&mut self) -> Result<(), DatabaseError> {
        let Some(mut conn) = self.attach.take() else {
            return Err(DatabaseError::NotAttached);
        };
        sqlx::query("DETACH DATABASE envelope")
            .execute(&mut *conn)
            .await?;
        log::debug!("detached Envelope Index");
        Ok(())
    }

    /// Project the attached Envelope Index into the canonical schema.
    ///
    /// Runs addresses, then mailboxes, then messages inside a single write
    /// transaction; a failure in any pass rolls the whole run back. Message
    /// ids come from [`generate_message_id`], so a re-run against the same
    /// upstream leaves identical rows and counts.
    pub async fn perform_bulk_copy(&mut self) -> Result<BulkCopyCounts, DatabaseError> {
        let Some(conn) = self.attach.as_mut() else {
            return Err(DatabaseError::NotAttached);
        };

        let mut tx = conn.begin().await?;

        let address_count = sqlx::query(
            "INSERT OR REPLACE INTO addresses (rowid, address, comment) \
             SELECT ROWID, NULLIF(address, ''), NULLIF(comment, '') FROM envelope.addresses",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mailbox_rows = sqlx::query("SELECT ROWID AS rowid, url FROM envelope.mailboxes")
            .fetch_all(&mut *tx)
            .await?;
        let mut mailbox_count = 0u64;
        for row in &mailbox_rows {
            let url: String = row.get("url");
            let id = mailbox_id_for_url(&url);
            let name = extract_mailbox_name(&url).unwrap_or_else(|| url.clone());
            let account_id = extract_account_id(&url);
            sqlx::query("INSERT OR REPLACE INTO mailboxes (id, name, account_id) VALUES (?1, ?2, ?3)")
                .bind(&id)
                .bind(&name)
                .bind(&account_id)
                .execute(&mut *tx)
                .await?;
            mailbox_count += 1;
        }

        let message_rows = sqlx::query(SELECT_WITH_JOINS_QUERY).fetch_all(&mut *tx).await?;
        let mut message_count = 0u64;
        for row in &message_rows {
            let rowid: i64 = row.get("rowid");
            let subject: Option<String> = row.get("subject");
            let sender_email: Option<String> = row.get("sender_email");
            let sender_name: Option<String> = row
                .get::<Option<String>, _>("sender_name")
                .filter(|name| !name.is_empty());
            let date_received: Option<f64> = row.get("date_received");
            let date_sent: Option<f64> = row.get("date_sent");
            let message_id: Option<String> = row.get("message_id");
            let mailbox_url: Option<String> = row.get("mailbox_url");
            let is_read: Option<i64> = row.get("is_read");
            let is_flagged: Option<i64> = row.get("is_flagged");

            let date_received = date_received.map(convert_date);
            let date_sent = date_sent.map(convert_date);
            let id = generate_message_id(
                message_id.as_deref(),
                subject.as_deref(),
                sender_email.as_deref(),
                date_received,
                Some(rowid),
            );
            let (mailbox_id, mailbox_name) = match &mailbox_url {
                Some(url) => (Some(mailbox_id_for_url(url)), extract_mailbox_name(url)),
                None => (None, None),
            };

            // Merge upsert: upstream-owned columns refresh; locally-owned
            // is_deleted and thread_id survive re-ingestion.
            sqlx::query(
                r#"
                INSERT INTO messages (
                    id, apple_rowid, message_id, mailbox_id, mailbox_name, subject,
                    sender_name, sender_email, date_received, date_sent, is_read, is_flagged
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(id) DO UPDATE SET
                    apple_rowid = excluded.apple_rowid,
                    message_id = excluded.message_id,
                    mailbox_id = excluded.mailbox_id,
                    mailbox_name = excluded.mailbox_name,
                    subject = excluded.subject,
                    sender_name = excluded.sender_name,
                    sender_email = excluded.sender_email,
                    date_received = excluded.date_received,
                    date_sent = excluded.date_sent,
                    is_read = excluded.is_read,
                    is_flagged = excluded.is_flagged
                "#,
            )
            .bind(&id)
            .bind(rowid)
            .bind(&message_id)
            .bind(&mailbox_id)
            .bind(&mailbox_name)
            .bind(&subject)
            .bind(&sender_name)
            .bind(&sender_email)
            .bind(date_received)
            .bind(date_sent)
            .bind(is_read.map(convert_bool).unwrap_or(false))
            .bind(is_flagged.map(convert_bool).unwrap_or(false))
            .execute(&mut *tx)
            .await?;
            message_count += 1;
        }

        tx.commit().await?;

        let counts = BulkCopyCounts {
            message_count,
            mailbox_count,
            address_count,
            total_count: message_count + mailbox_count + address_count,
        };
        log::info!(
            "bulk copy complete: {} messages, {} mailboxes, {} addresses",
            counts.message_count,
            counts.mailbox_count,
            counts.address_count
        );
        Ok(counts)
    }

    /// Which of `row_ids` exist in the attached upstream.
    pub async fn envelope_rowids_present(
        &mut self,
        row_ids: &[i64],
    ) -> Result<Vec<i64>, DatabaseError> {
        if row_ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(conn) = self.attach.as_mut() else {
            return Err(DatabaseError::NotAttached);
        };
        let rows = sqlx::query(&exists_query(row_ids))
            .fetch_all(&mut **conn)
            .await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>(0)).collect())
    }

    /// Read/flagged status for `row_ids` in the attached upstream.
    pub async fn envelope_message_status(
        &mut self,
        row_ids: &[i64],
    ) -> Result<Vec<EnvelopeMessageStatus>, DatabaseError> {
        if row_ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(conn) = self.attach.as_mut() else {
            return Err(DatabaseError::NotAttached);
        };
        let rows = sqlx::query(&status_query(row_ids))
            .fetch_all(&mut **conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| EnvelopeMessageStatus {
                rowid: row.get("rowid"),
                is_read: convert_bool(row.get::<i64, _>("is_read")),
                is_flagged: convert_bool(row.get::<i64, _>("is_flagged")),
            })
            .collect())
    }
}
