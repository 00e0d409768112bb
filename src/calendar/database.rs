//! Calendar schema and query operations.
//!
//! Deletes cascade: removing a calendar removes its events, removing an
//! event removes its attendees. Event text is mirrored into an FTS5 table
//! maintained by triggers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::DatabaseError;
use crate::models::{StoredAttendee, StoredCalendar, StoredEvent};

/// Connection pool size for a calendar database.
const POOL_SIZE: u32 = 4;

/// Sync-status key holding the last successful sync time.
const LAST_SYNC_TIME_KEY: &str = "last_sync_time";

/// Handle to a calendar database at a caller-supplied path.
///
/// `initialize` is idempotent; queries issued before it fail with
/// `NotInitialized`.
pub struct CalendarDatabase {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl CalendarDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.is_some()
    }

    fn pool(&self) -> Result<&SqlitePool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotInitialized)
    }

    /// Open the database and apply the schema. A second call is a no-op.
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

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calendars (
                id TEXT PRIMARY KEY,
                eventkit_id TEXT,
                title TEXT NOT NULL,
                source_type TEXT,
                color TEXT,
                is_subscribed INTEGER NOT NULL DEFAULT 0,
                is_immutable INTEGER NOT NULL DEFAULT 0,
                synced_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                eventkit_id TEXT,
                external_id TEXT,
                calendar_id TEXT NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
                summary TEXT,
                description TEXT,
                location TEXT,
                url TEXT,
                start_utc INTEGER NOT NULL,
                end_utc INTEGER NOT NULL,
                start_tz TEXT,
                end_tz TEXT,
                is_all_day INTEGER NOT NULL DEFAULT 0,
                recurrence_rule TEXT,
                master_event_id TEXT,
                occurrence_date INTEGER,
                status TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                synced_at INTEGER NOT NULL,
                CHECK (end_utc >= start_utc)
            );

            CREATE INDEX IF NOT EXISTS idx_events_calendar ON events(calendar_id);
            CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_utc);
            CREATE INDEX IF NOT EXISTS idx_events_eventkit ON events(eventkit_id);
            CREATE INDEX IF NOT EXISTS idx_events_master ON events(master_event_id);

            CREATE TABLE IF NOT EXISTS attendees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                name TEXT,
                email TEXT,
                response_status TEXT,
                is_organizer INTEGER NOT NULL DEFAULT 0,
                is_optional INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_attendees_event ON attendees(event_id);

            CREATE TABLE IF NOT EXISTS sync_status (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS event_fts USING fts5(
                summary, description, location,
                content='events', content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS event_fts_ai AFTER INSERT ON events BEGIN
                INSERT INTO event_fts(rowid, summary, description, location)
                VALUES (new.rowid, new.summary, new.description, new.location);
            END;

            CREATE TRIGGER IF NOT EXISTS event_fts_ad AFTER DELETE ON events BEGIN
                INSERT INTO event_fts(event_fts, rowid, summary, description, location)
                VALUES ('delete', old.rowid, old.summary, old.description, old.location);
            END;

            CREATE TRIGGER IF NOT EXISTS event_fts_au AFTER UPDATE ON events BEGIN
                INSERT INTO event_fts(event_fts, rowid, summary, description, location)
                VALUES ('delete', old.rowid, old.summary, old.description, old.location);
                INSERT INTO event_fts(rowid, summary, description, location)
                VALUES (new.rowid, new.summary, new.description, new.location);
            END;
            "#,
        )
        .execute(&pool)
        .await?;

        log::info!("calendar database ready at {}", self.path.display());
        self.pool = Some(pool);
        Ok(())
    }

    /// Release the underlying file handles.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }

    pub async fn upsert_calendar(&self, calendar: &StoredCalendar) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO calendars
                (id, eventkit_id, title, source_type, color, is_subscribed, is_immutable, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&calendar.id)
        .bind(&calendar.eventkit_id)
        .bind(&calendar.title)
        .bind(&calendar.source_type)
        .bind(&calendar.color)
        .bind(calendar.is_subscribed)
        .bind(calendar.is_immutable)
        .bind(calendar.synced_at)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn get_calendar(&self, id: &str) -> Result<Option<StoredCalendar>, DatabaseError> {
        let calendar = sqlx::query_as::<_, StoredCalendar>(
            "SELECT * FROM calendars WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(calendar)
    }

    pub async fn get_calendars(&self) -> Result<Vec<StoredCalendar>, DatabaseError> {
        let calendars = sqlx::query_as::<_, StoredCalendar>(
            "SELECT * FROM calendars ORDER BY title COLLATE NOCASE",
        )
        .fetch_all(self.pool()?)
        .await?;
        Ok(calendars)
    }

    /// Delete a calendar; its events and their attendees cascade away.
    pub async fn delete_calendar(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM calendars WHERE id = ?1")
            .bind(id)
            .execute(self.pool()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_event(&self, event: &StoredEvent) -> Result<(), DatabaseError> {
        Self::upsert_event_on(self.pool()?, event).await
    }

    async fn upsert_event_on<'e, E>(executor: E, event: &StoredEvent) -> Result<(), DatabaseError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO events (
                id, eventkit_id, external_id, calendar_id, summary, description,
                location, url, start_utc, end_utc, start_tz, end_tz, is_all_day,
                recurrence_rule, master_event_id, occurrence_date, status,
                created_at, updated_at, synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(id) DO UPDATE SET
                eventkit_id = excluded.eventkit_id,
                external_id = excluded.external_id,
                calendar_id = excluded.calendar_id,
                summary = excluded.summary,
                description = excluded.description,
                location = excluded.location,
                url = excluded.url,
                start_utc = excluded.start_utc,
                end_utc = excluded.end_utc,
                start_tz = excluded.start_tz,
                end_tz = excluded.end_tz,
                is_all_day = excluded.is_all_day,
                recurrence_rule = excluded.recurrence_rule,
                master_event_id = excluded.master_event_id,
                occurrence_date = excluded.occurrence_date,
                status = excluded.status,
                updated_at = excluded.updated_at,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&event.id)
        .bind(&event.eventkit_id)
        .bind(&event.external_id)
        .bind(&event.calendar_id)
        .bind(&event.summary)
        .bind(&event.description)
        .bind(&event.location)
        .bind(&event.url)
        .bind(event.start_utc)
        .bind(event.end_utc)
        .bind(&event.start_tz)
        .bind(&event.end_tz)
        .bind(event.is_all_day)
        .bind(&event.recurrence_rule)
        .bind(&event.master_event_id)
        .bind(event.occurrence_date)
        .bind(&event.status)
        .bind(event.created_at)
        .bind(event.updated_at)
        .bind(event.synced_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Upsert a batch of events inside one transaction.
    pub async fn upsert_events(&self, events: &[StoredEvent]) -> Result<u64, DatabaseError> {
        let mut tx = self.pool()?.begin().await?;
        for event in events {
            Self::upsert_event_on(&mut *tx, event).await?;
        }
        tx.commit().await?;
        log::debug!("upserted {} events", events.len());
        Ok(events.len() as u64)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<StoredEvent>, DatabaseError> {
        let event = sqlx::query_as::<_, StoredEvent>("SELECT * FROM events WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(event)
    }

    pub async fn get_event_by_eventkit_id(
        &self,
        eventkit_id: &str,
    ) -> Result<Option<StoredEvent>, DatabaseError> {
        let event = sqlx::query_as::<_, StoredEvent>("SELECT * FROM events WHERE eventkit_id = ?1")
            .bind(eventkit_id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(event)
    }

    /// Events whose `[start_utc, end_utc)` interval intersects
    /// `[from, to)`.
    pub async fn get_events(&self, from: i64, to: i64) -> Result<Vec<StoredEvent>, DatabaseError> {
        let events = sqlx::query_as::<_, StoredEvent>(
            "SELECT * FROM events WHERE start_utc < ?1 AND end_utc > ?2 ORDER BY start_utc ASC",
        )
        .bind(to)
        .bind(from)
        .fetch_all(self.pool()?)
        .await?;
        Ok(events)
    }

    /// The next `limit` events starting now or later.
    pub async fn get_upcoming_events(&self, limit: i64) -> Result<Vec<StoredEvent>, DatabaseError> {
        let now = Utc::now().timestamp();
        let events = sqlx::query_as::<_, StoredEvent>(
            "SELECT * FROM events WHERE start_utc >= ?1 ORDER BY start_utc ASC LIMIT ?2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;
        Ok(events)
    }

    /// Delete one event (attendees cascade). Returns whether a row went
    /// away.
    pub async fn delete_event(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?1")
            .bind(id)
            .execute(self.pool()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Prune a calendar's events that are absent upstream. Returns the
    /// number of rows removed.
    pub async fn delete_events_not_in(
        &self,
        ids: &[String],
        calendar_id: &str,
    ) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            let result = sqlx::query("DELETE FROM events WHERE calendar_id = ?1")
                .bind(calendar_id)
                .execute(self.pool()?)
                .await?;
            return Ok(result.rows_affected());
        }

        let placeholders = (0..ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM events WHERE calendar_id = ?1 AND id NOT IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(calendar_id);
        for id in ids {
            query = query.bind(id);
        }
        let result = query.execute(self.pool()?).await?;
        Ok(result.rows_affected())
    }

    pub async fn upsert_attendee(&self, attendee: &StoredAttendee) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO attendees (event_id, name, email, response_status, is_organizer, is_optional)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&attendee.event_id)
        .bind(&attendee.name)
        .bind(&attendee.email)
        .bind(&attendee.response_status)
        .bind(attendee.is_organizer)
        .bind(attendee.is_optional)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Replace an event's attendees wholesale: delete-all plus insert-all in
    /// one transaction.
    pub async fn replace_attendees(
        &self,
        event_id: &str,
        attendees: &[StoredAttendee],
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool()?.begin().await?;
        sqlx::query("DELETE FROM attendees WHERE event_id = ?1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;
        for attendee in attendees {
            sqlx::query(
                r#"
                INSERT INTO attendees
                    (event_id, name, email, response_status, is_organizer, is_optional)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(event_id)
            .bind(&attendee.name)
            .bind(&attendee.email)
            .bind(&attendee.response_status)
            .bind(attendee.is_organizer)
            .bind(attendee.is_optional)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// An event's attendees, organizer first.
    pub async fn get_attendees(&self, event_id: &str) -> Result<Vec<StoredAttendee>, DatabaseError> {
        let attendees = sqlx::query_as::<_, StoredAttendee>(
            r#"
            SELECT event_id, name, email, response_status, is_organizer, is_optional
            FROM attendees
            WHERE event_id = ?1
            ORDER BY is_organizer DESC, name COLLATE NOCASE
            "#,
        )
        .bind(event_id)
        .fetch_all(self.pool()?)
        .await?;
        Ok(attendees)
    }

    /// Full-text search over summary, description, and location.
    pub async fn search_events(&self, query: &str) -> Result<Vec<StoredEvent>, DatabaseError> {
        let match_expr = query
            .split_whitespace()
            .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" ");
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT e.* FROM event_fts
            JOIN events e ON e.rowid = event_fts.rowid
            WHERE event_fts MATCH ?1
            ORDER BY rank
            "#,
        )
        .bind(match_expr)
        .fetch_all(self.pool()?)
        .await?;
        Ok(events)
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

    pub async fn set_last_sync_time(&self, unix_seconds: i64) -> Result<(), DatabaseError> {
        self.set_sync_status(LAST_SYNC_TIME_KEY, &unix_seconds.to_string())
            .await
    }

    pub async fn get_last_sync_time(&self) -> Result<Option<i64>, DatabaseError> {
        Ok(self
            .get_sync_status(LAST_SYNC_TIME_KEY)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }
}
