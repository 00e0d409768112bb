//! Canonical mail schema and query operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::error::DatabaseError;
use crate::models::{AddressRecord, MailMessage, MailThread, Mailbox};

/// Connection pool size for a vault's mail database.
const POOL_SIZE: u32 = 4;

/// Sort orders for thread listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSortBy {
    /// Most recent activity first.
    Date,
    /// Subject, case-insensitive ascending.
    Subject,
    /// Largest threads first.
    MessageCount,
}

/// Handle to a vault's canonical mail database.
///
/// `initialize` is idempotent; every query issued before it fails with
/// `NotInitialized`. At most one Envelope Index can be attached at a time
/// (the attach slot holds its own connection, because `ATTACH` is scoped to
/// a single SQLite connection).
pub struct MailDatabase {
    path: PathBuf,
    pool: Option<SqlitePool>,
    pub(crate) attach: Option<PoolConnection<Sqlite>>,
}

impl MailDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: None,
            attach: None,
        }
    }

    /// The database file this handle points at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    pub(crate) fn pool(&self) -> Result<&SqlitePool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotInitialized)
    }

    /// Open the database and apply the canonical schema. Calling this twice
    /// on the same handle is a no-op.
    pub async fn initialize(&mut self) -> Result<(), DatabaseError> {
        if self.pool.is_some() {
            return Ok(());
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;

        Self::apply_schema(&pool).await?;
        log::info!("mail database ready at {}", self.path.display());
        self.pool = Some(pool);
        Ok(())
    }

    /// Release the underlying file handles. Any active attach is dropped.
    pub async fn close(&mut self) {
        self.attach = None;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                apple_rowid INTEGER,
                message_id TEXT,
                mailbox_id TEXT,
                mailbox_name TEXT,
                subject TEXT,
                sender_name TEXT,
                sender_email TEXT,
                date_received INTEGER,
                date_sent INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_flagged INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                thread_id TEXT,
                in_reply_to TEXT,
                "references" TEXT,
                body_preview TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_messages_apple_rowid ON messages(apple_rowid);
            CREATE INDEX IF NOT EXISTS idx_messages_mailbox ON messages(mailbox_id);
            CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
            CREATE INDEX IF NOT EXISTS idx_messages_date ON messages(date_received DESC);
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_email);

            CREATE TABLE IF NOT EXISTS mailboxes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                account_id TEXT
            );

            CREATE TABLE IF NOT EXISTS addresses (
                rowid INTEGER PRIMARY KEY,
                address TEXT,
                comment TEXT
            );

            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                subject TEXT,
                participant_count INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                first_date INTEGER,
                last_date INTEGER
            );

            CREATE TABLE IF NOT EXISTS thread_messages (
                thread_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (thread_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_thread_messages_position
                ON thread_messages(thread_id, position);

            CREATE TABLE IF NOT EXISTS sync_status (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        // FTS mirror over messages, maintained by triggers. body_preview is
        // indexed so body search lights up once preview extraction runs.
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
                subject, sender_email, body_preview,
                content='messages', content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS messages_fts_ai AFTER INSERT ON messages BEGIN
                INSERT INTO messages_fts(rowid, subject, sender_email, body_preview)
                VALUES (new.rowid, new.subject, new.sender_email, new.body_preview);
            END;

            CREATE TRIGGER IF NOT EXISTS messages_fts_ad AFTER DELETE ON messages BEGIN
                INSERT INTO messages_fts(messages_fts, rowid, subject, sender_email, body_preview)
                VALUES ('delete', old.rowid, old.subject, old.sender_email, old.body_preview);
            END;

            CREATE TRIGGER IF NOT EXISTS messages_fts_au AFTER UPDATE ON messages BEGIN
                INSERT INTO messages_fts(messages_fts, rowid, subject, sender_email, body_preview)
                VALUES ('delete', old.rowid, old.subject, old.sender_email, old.body_preview);
                INSERT INTO messages_fts(rowid, subject, sender_email, body_preview)
                VALUES (new.rowid, new.subject, new.sender_email, new.body_preview);
            END;
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a message row, keyed on its stable id.
    pub async fn upsert_message(&self, message: &MailMessage) -> Result<(), DatabaseError> {
        let references = join_references(&message.references);
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, apple_rowid, message_id, mailbox_id, mailbox_name, subject,
                sender_name, sender_email, date_received, date_sent,
                is_read, is_flagged, is_deleted, has_attachments,
                thread_id, in_reply_to, "references", body_preview
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
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
                is_flagged = excluded.is_flagged,
                is_deleted = excluded.is_deleted,
                has_attachments = excluded.has_attachments,
                thread_id = excluded.thread_id,
                in_reply_to = excluded.in_reply_to,
                "references" = excluded."references",
                body_preview = excluded.body_preview
            "#,
        )
        .bind(&message.id)
        .bind(message.apple_rowid)
        .bind(&message.message_id)
        .bind(&message.mailbox_id)
        .bind(&message.mailbox_name)
        .bind(&message.subject)
        .bind(&message.sender_name)
        .bind(&message.sender_email)
        .bind(message.date_received)
        .bind(message.date_sent)
        .bind(message.is_read)
        .bind(message.is_flagged)
        .bind(message.is_deleted)
        .bind(message.has_attachments)
        .bind(&message.thread_id)
        .bind(&message.in_reply_to)
        .bind(references)
        .bind(&message.body_preview)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR REPLACE INTO mailboxes (id, name, account_id) VALUES (?1, ?2, ?3)")
            .bind(&mailbox.id)
            .bind(&mailbox.name)
            .bind(&mailbox.account_id)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    pub async fn upsert_thread(&self, thread: &MailThread) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO threads
                (id, subject, participant_count, message_count, first_date, last_date)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&thread.id)
        .bind(&thread.subject)
        .bind(thread.participant_count)
        .bind(thread.message_count)
        .bind(thread.first_date)
        .bind(thread.last_date)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Fetch a message by its upstream Envelope Index ROWID.
    pub async fn get_message(&self, apple_rowid: i64) -> Result<Option<MailMessage>, DatabaseError> {
        let row = sqlx::query("SELECT * FROM messages WHERE apple_rowid = ?1")
            .bind(apple_rowid)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    /// Fetch a message by its stable id.
    pub async fn get_message_by_id(&self, id: &str) -> Result<Option<MailMessage>, DatabaseError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    /// Page through messages, newest first, optionally scoped to a mailbox
    /// and/or unread messages only.
    pub async fn get_messages(
        &self,
        limit: i64,
        offset: i64,
        mailbox_id: Option<&str>,
        unread_only: bool,
    ) -> Result<Vec<MailMessage>, DatabaseError> {
        let mut sql = String::from("SELECT * FROM messages WHERE 1 = 1");
        if mailbox_id.is_some() {
            sql.push_str(" AND mailbox_id = ?");
        }
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY date_received DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(mailbox) = mailbox_id {
            query = query.bind(mailbox);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn get_mailboxes(&self) -> Result<Vec<Mailbox>, DatabaseError> {
        let mailboxes = sqlx::query_as::<_, Mailbox>(
            "SELECT id, name, account_id FROM mailboxes ORDER BY name COLLATE NOCASE",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(mailboxes)
    }

    pub async fn get_address(&self, rowid: i64) -> Result<Option<AddressRecord>, DatabaseError> {
        let address = sqlx::query_as::<_, AddressRecord>(
            "SELECT rowid, address, comment FROM addresses WHERE rowid = ?1",
        )
        .bind(rowid)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(address)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Option<MailThread>, DatabaseError> {
        let thread = sqlx::query_as::<_, MailThread>(
            r#"
            SELECT id, subject, participant_count, message_count, first_date, last_date
            FROM threads WHERE id = ?1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(thread)
    }

    /// Page through threads, optionally restricted to ones a participant
    /// has sent into.
    pub async fn get_threads(
        &self,
        limit: i64,
        offset: i64,
        sort_by: ThreadSortBy,
        participant: Option<&str>,
    ) -> Result<Vec<MailThread>, DatabaseError> {
        let order = match sort_by {
            ThreadSortBy::Date => "last_date DESC",
            ThreadSortBy::Subject => "subject COLLATE NOCASE ASC",
            ThreadSortBy::MessageCount => "message_count DESC",
        };

        let mut sql = String::from(
            "SELECT id, subject, participant_count, message_count, first_date, last_date \
             FROM threads",
        );
        if participant.is_some() {
            sql.push_str(PARTICIPANT_FILTER);
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT ? OFFSET ?", order));

        let mut query = sqlx::query_as::<_, MailThread>(&sql);
        if let Some(participant) = participant {
            query = query.bind(participant);
        }
        let threads = query
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool()?)
            .await?;
        Ok(threads)
    }

    pub async fn get_thread_count(&self, participant: Option<&str>) -> Result<i64, DatabaseError> {
        let mut sql = String::from("SELECT COUNT(*) FROM threads");
        if participant.is_some() {
            sql.push_str(PARTICIPANT_FILTER);
        }

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(participant) = participant {
            query = query.bind(participant);
        }
        Ok(query.fetch_one(self.pool()?).await?)
    }

    /// Messages of a thread in junction order.
    pub async fn get_messages_in_thread_via_junction(
        &self,
        thread_id: &str,
        limit: i64,
    ) -> Result<Vec<MailMessage>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT m.* FROM thread_messages tm
            JOIN messages m ON m.id = tm.message_id
            WHERE tm.thread_id = ?1
            ORDER BY tm.position ASC
            LIMIT ?2
            "#,
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Recompute junction positions for a thread by ascending receive date.
    pub async fn update_thread_positions(&self, thread_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            WITH ordered AS (
                SELECT tm.message_id,
                       ROW_NUMBER() OVER (ORDER BY m.date_received ASC, m.id ASC) - 1 AS pos
                FROM thread_messages tm
                JOIN messages m ON m.id = tm.message_id
                WHERE tm.thread_id = ?1
            )
            UPDATE thread_messages
            SET position = (
                SELECT pos FROM ordered WHERE ordered.message_id = thread_messages.message_id
            )
            WHERE thread_id = ?1
            "#,
        )
        .bind(thread_id)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Full-text search over subject, sender, and body preview.
    pub async fn search_messages(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<MailMessage>, DatabaseError> {
        let match_expr = fts_quote(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT m.* FROM messages_fts
            JOIN messages m ON m.rowid = messages_fts.rowid
            WHERE messages_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(match_expr)
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn message_count(&self) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(self.pool()?)
            .await?)
    }

    pub async fn mailbox_count(&self) -> Result<i64, DatabaseError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM mailboxes")
            .fetch_one(self.pool()?)
            .await?)
    }

    pub async fn set_sync_status(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query("INSERT OR REPLACE INTO sync_status (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    pub async fn get_sync_status(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = sqlx::query_scalar("SELECT value FROM sync_status WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(value)
    }
}

const PARTICIPANT_FILTER: &str = " WHERE EXISTS (\
     SELECT 1 FROM thread_messages tm \
     JOIN messages m ON m.id = tm.message_id \
     WHERE tm.thread_id = threads.id AND m.sender_email = ?)";

/// Space-join reference tokens for storage; `None` when empty.
fn join_references(references: &[String]) -> Option<String> {
    if references.is_empty() {
        None
    } else {
        Some(references.join(" "))
    }
}

/// Quote every whitespace token so FTS5 operators in user input are inert.
fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn message_from_row(row: &SqliteRow) -> MailMessage {
    let references: Option<String> = row.get("references");
    MailMessage {
        id: row.get("id"),
        apple_rowid: row.get("apple_rowid"),
        message_id: row.get("message_id"),
        mailbox_id: row.get("mailbox_id"),
        mailbox_name: row.get("mailbox_name"),
        subject: row.get("subject"),
        sender_name: row.get("sender_name"),
        sender_email: row.get("sender_email"),
        date_received: row.get("date_received"),
        date_sent: row.get("date_sent"),
        is_read: row.get("is_read"),
        is_flagged: row.get("is_flagged"),
        is_deleted: row.get("is_deleted"),
        has_attachments: row.get("has_attachments"),
        thread_id: row.get("thread_id"),
        in_reply_to: row.get("in_reply_to"),
        references: references
            .map(|joined| joined.split_whitespace().map(String::from).collect())
            .unwrap_or_default(),
        body_preview: row.get("body_preview"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_db(tmp: &TempDir) -> MailDatabase {
        let mut db = MailDatabase::new(tmp.path().join("swiftea.db"));
        db.initialize().await.unwrap();
        db
    }

    fn message(id: &str, subject: &str, sender: &str, date: i64) -> MailMessage {
        let mut m = MailMessage::with_id(id.to_string());
        m.subject = Some(subject.to_string());
        m.sender_email = Some(sender.to_string());
        m.date_received = Some(date);
        m
    }

    #[tokio::test]
    async fn queries_before_initialize_fail() {
        let db = MailDatabase::new("/tmp/never-created.db");
        let err = db.get_mailboxes().await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotInitialized));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut db = open_db(&tmp).await;
        db.initialize().await.unwrap();
        db.upsert_message(&message("a".repeat(32).as_str(), "S", "x@y", 1))
            .await
            .unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn upsert_replaces_on_same_id() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;

        let id = "b".repeat(32);
        let mut m = message(&id, "First", "x@y.example", 100);
        m.apple_rowid = Some(7);
        db.upsert_message(&m).await.unwrap();

        m.subject = Some("Second".to_string());
        m.is_read = true;
        db.upsert_message(&m).await.unwrap();

        assert_eq!(db.message_count().await.unwrap(), 1);
        let stored = db.get_message(7).await.unwrap().unwrap();
        assert_eq!(stored.subject.as_deref(), Some("Second"));
        assert!(stored.is_read);
    }

    #[tokio::test]
    async fn references_round_trip() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;

        let id = "c".repeat(32);
        let mut m = message(&id, "S", "x@y.example", 1);
        m.references = vec!["<a@x>".to_string(), "<b@x>".to_string()];
        db.upsert_message(&m).await.unwrap();

        let stored = db.get_message_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.references, vec!["<a@x>", "<b@x>"]);
    }

    #[tokio::test]
    async fn message_filters_and_paging() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;

        for i in 0..5i64 {
            let mut m = message(&format!("{:032x}", i), "S", "x@y.example", 100 + i);
            m.mailbox_id = Some(if i % 2 == 0 { "inbox" } else { "sent" }.to_string());
            m.is_read = i < 2;
            db.upsert_message(&m).await.unwrap();
        }

        let newest_first = db.get_messages(10, 0, None, false).await.unwrap();
        assert_eq!(newest_first.len(), 5);
        assert!(newest_first[0].date_received >= newest_first[4].date_received);

        let inbox_only = db.get_messages(10, 0, Some("inbox"), false).await.unwrap();
        assert_eq!(inbox_only.len(), 3);

        let unread_inbox = db.get_messages(10, 0, Some("inbox"), true).await.unwrap();
        assert!(unread_inbox.iter().all(|m| !m.is_read));
    }

    #[tokio::test]
    async fn fts_search_matches_subject_and_sender() {
        let tmp = TempDir::new().unwrap();
        let db = open_db(&tmp).await;

        db.upsert_message(&message(
            &"d".repeat(32),
            "Quarterly budget review",
            "finance@example.com",
            10,
        ))
        .await
        .unwrap();
        db.upsert_message(&message(&"e".repeat(32), "Lunch", "pal@example.com", 20))
            .await
            .unwrap();

        let by_subject = db.search_messages("budget", 10).await.unwrap();
        assert_eq!(by_subject.len(), 1);
        assert_eq!(by_subject[0].sender_email.as_deref(), Some("finance@example.com"));

        // Operators in user input must not be interpreted by FTS.
        let hostile = db.search_messages("budget OR", 10).await.unwrap();
        assert!(hostile.is_empty());

        // The FTS mirror follows updates and deletes.
        let updated = message(&"d".repeat(32), "Weekly standup notes", "finance@example.com", 10);
        db.upsert_message(&updated).await.unwrap();
        assert!(db.search_messages("budget", 10).await.unwrap().is_empty());
        assert_eq!(db.search_messages("standup", 10).await.unwrap().len(), 1);
    }
}
