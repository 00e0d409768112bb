//! Thread detection and message→thread linking.

use sqlx::{Sqlite, Transaction};

use crate::error::DatabaseError;
use crate::identity::{normalize_message_id, random_id, stable_hash_hex};
use crate::mail::MailDatabase;
use crate::models::{MailMessage, ThreadingBatchSummary, ThreadingOutcome};

/// Map a message to its conversation id.
///
/// Evidence is tried strongest-first: the thread root from `References`
/// (its first token), then `In-Reply-To`, then the normalized subject, then
/// the message's own id. A message with none of these gets a random id and
/// forms a thread of one.
pub fn detect_thread_id(
    message_id: Option<&str>,
    in_reply_to: Option<&str>,
    references: &[String],
    subject: Option<&str>,
) -> String {
    let root = references
        .iter()
        .find_map(|token| normalize_message_id(token))
        .or_else(|| in_reply_to.and_then(normalize_message_id));
    if let Some(root) = root {
        return stable_hash_hex(&format!("thread-mid:{}", root));
    }

    if let Some(subject) = subject {
        let normalized = normalize_subject(subject);
        if !normalized.is_empty() {
            return stable_hash_hex(&format!("thread-subj:{}", normalized));
        }
    }

    if let Some(own) = message_id.and_then(normalize_message_id) {
        return stable_hash_hex(&format!("thread-msg:{}", own));
    }

    random_id()
}

/// Normalize a subject for thread grouping: strip the leading chain of
/// `Re:`/`Fwd:`/`Fw:` prefixes, collapse whitespace, lowercase.
pub fn normalize_subject(subject: &str) -> String {
    let mut normalized = subject.trim().to_lowercase();

    loop {
        let before = normalized.clone();
        for prefix in &["re:", "fwd:", "fw:"] {
            if normalized.starts_with(prefix) {
                normalized = normalized[prefix.len()..].trim_start().to_string();
            }
        }
        if before == normalized {
            break;
        }
    }

    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the message is a reply: it carries In-Reply-To, or its subject
/// starts with a `Re:` prefix.
pub fn is_reply(in_reply_to: Option<&str>, subject: Option<&str>) -> bool {
    if in_reply_to.is_some_and(|v| !v.trim().is_empty()) {
        return true;
    }
    subject.is_some_and(|s| s.trim().to_lowercase().starts_with("re:"))
}

/// True when the subject carries a `Fwd:`/`Fw:` prefix.
pub fn is_forwarded(subject: Option<&str>) -> bool {
    subject.is_some_and(|s| {
        let lowered = s.trim().to_lowercase();
        lowered.starts_with("fwd:") || lowered.starts_with("fw:")
    })
}

/// Link one message into its thread and refresh the thread's metadata.
///
/// Creates the thread row on first sight, appends the message to the
/// junction table at the next position, stamps the message's `thread_id`
/// column, and recomputes `message_count` / `participant_count` / date
/// bounds from the junction.
pub async fn process_message_for_threading(
    db: &MailDatabase,
    message: &MailMessage,
) -> Result<ThreadingOutcome, DatabaseError> {
    let mut tx = db.pool()?.begin().await?;
    let outcome = link_message(&mut tx, message).await?;
    tx.commit().await?;
    Ok(outcome)
}

/// Thread a batch of messages, in the supplied order, in one transaction.
///
/// A per-message failure is logged and counted, not fatal; the rest of the
/// batch still commits.
pub async fn process_messages_for_threading(
    db: &MailDatabase,
    messages: &[MailMessage],
) -> Result<ThreadingBatchSummary, DatabaseError> {
    let mut tx = db.pool()?.begin().await?;
    let mut summary = ThreadingBatchSummary::default();

    for message in messages {
        match link_message(&mut tx, message).await {
            Ok(outcome) => {
                summary.processed += 1;
                if outcome.is_new_thread {
                    summary.new_threads += 1;
                }
            }
            Err(err) => {
                log::warn!("threading failed for message {}: {}", message.id, err);
                summary.failed += 1;
            }
        }
    }

    tx.commit().await?;
    log::debug!(
        "threaded batch: {} processed, {} failed, {} new threads",
        summary.processed,
        summary.failed,
        summary.new_threads
    );
    Ok(summary)
}

async fn link_message(
    tx: &mut Transaction<'_, Sqlite>,
    message: &MailMessage,
) -> Result<ThreadingOutcome, DatabaseError> {
    let thread_id = detect_thread_id(
        message.message_id.as_deref(),
        message.in_reply_to.as_deref(),
        &message.references,
        message.subject.as_deref(),
    );

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT message_count FROM threads WHERE id = ?1")
            .bind(&thread_id)
            .fetch_optional(&mut **tx)
            .await?;
    let is_new_thread = existing.is_none();
    let position = existing.map(|(count,)| count).unwrap_or(0);

    if is_new_thread {
        let subject = message.subject.as_deref().map(normalize_subject);
        sqlx::query(
            r#"
            INSERT INTO threads
                (id, subject, participant_count, message_count, first_date, last_date)
            VALUES (?1, ?2, 0, 0, ?3, ?3)
            "#,
        )
        .bind(&thread_id)
        .bind(subject)
        .bind(message.date_received)
        .execute(&mut **tx)
        .await?;
    }

    sqlx::query(
        "INSERT OR REPLACE INTO thread_messages (thread_id, message_id, position) VALUES (?1, ?2, ?3)",
    )
    .bind(&thread_id)
    .bind(&message.id)
    .bind(position)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE messages SET thread_id = ?1 WHERE id = ?2")
        .bind(&thread_id)
        .bind(&message.id)
        .execute(&mut **tx)
        .await?;

    refresh_thread_metadata(&mut **tx, &thread_id).await?;

    Ok(ThreadingOutcome {
        thread_id,
        is_new_thread,
    })
}

/// Recompute a thread's aggregates from its junction rows.
pub(crate) async fn refresh_thread_metadata<'e, E>(
    executor: E,
    thread_id: &str,
) -> Result<(), DatabaseError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE threads SET
            message_count = (
                SELECT COUNT(*) FROM thread_messages WHERE thread_id = ?1
            ),
            participant_count = (
                SELECT COUNT(DISTINCT m.sender_email)
                FROM thread_messages tm
                JOIN messages m ON m.id = tm.message_id
                WHERE tm.thread_id = ?1 AND m.sender_email IS NOT NULL
            ),
            first_date = (
                SELECT MIN(m.date_received)
                FROM thread_messages tm
                JOIN messages m ON m.id = tm.message_id
                WHERE tm.thread_id = ?1
            ),
            last_date = (
                SELECT MAX(m.date_received)
                FROM thread_messages tm
                JOIN messages m ON m.id = tm.message_id
                WHERE tm.thread_id = ?1
            )
        WHERE id = ?1
        "#,
    )
    .bind(thread_id)
    .execute(executor)
    .await?;
    Ok(())
}
