use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use swiftea_core::error::DatabaseError;
use swiftea_core::mail::MailDatabase;
use tempfile::TempDir;

const MESSAGES: i64 = 10_000;
const MAILBOXES: i64 = 10;
const ADDRESSES: i64 = 100;

/// Build a mock Envelope Index with the upstream schema the projection
/// consumes: normalized subjects/addresses plus url-keyed mailboxes.
async fn build_mock_envelope_index(path: &Path) -> sqlx::Result<()> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true);
    let mut conn = SqliteConnection::connect_with(&options).await?;

    sqlx::query(
        r#"
        CREATE TABLE messages (
            ROWID INTEGER PRIMARY KEY,
            subject INTEGER,
            sender INTEGER,
            date_received REAL,
            date_sent REAL,
            message_id TEXT,
            mailbox INTEGER,
            read INTEGER,
            flagged INTEGER
        );
        CREATE TABLE subjects (ROWID INTEGER PRIMARY KEY, subject TEXT);
        CREATE TABLE addresses (ROWID INTEGER PRIMARY KEY, address TEXT, comment TEXT);
        CREATE TABLE mailboxes (ROWID INTEGER PRIMARY KEY, url TEXT);
        "#,
    )
    .execute(&mut conn)
    .await?;

    let mut tx = conn.begin().await?;
    for i in 0..MAILBOXES {
        let url = if i == 0 {
            "mailbox://acct-1/inbox".to_string()
        } else {
            format!("mailbox://acct-1/Folder{}", i)
        };
        sqlx::query("INSERT INTO mailboxes (ROWID, url) VALUES (?1, ?2)")
            .bind(i + 1)
            .bind(url)
            .execute(&mut *tx)
            .await?;
    }
    for i in 0..ADDRESSES {
        sqlx::query("INSERT INTO addresses (ROWID, address, comment) VALUES (?1, ?2, ?3)")
            .bind(i + 1)
            .bind(format!("sender{}@example.com", i))
            .bind(if i % 3 == 0 { "" } else { "Sender Person" })
            .execute(&mut *tx)
            .await?;
    }
    for i in 0..MESSAGES {
        sqlx::query("INSERT INTO subjects (ROWID, subject) VALUES (?1, ?2)")
            .bind(i + 1)
            .bind(format!("Subject number {}", i))
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO messages
                (ROWID, subject, sender, date_received, date_sent, message_id, mailbox, read, flagged)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(i + 1)
        .bind(i + 1)
        .bind(i % ADDRESSES + 1)
        .bind(1_690_000_000.5 + i as f64)
        .bind(1_690_000_000.0 + i as f64)
        .bind(format!("<msg{}@example.com>", i))
        .bind(i % MAILBOXES + 1)
        .bind(i % 2)
        .bind(0)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    conn.close().await?;
    Ok(())
}

async fn canonical_ids(db: &MailDatabase) -> BTreeSet<String> {
    db.get_messages(MESSAGES + 1, 0, None, false)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect()
}

struct Fixture {
    _tmp: TempDir,
    envelope_path: PathBuf,
    db: MailDatabase,
}

async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let envelope_path = tmp.path().join("Envelope Index");
    build_mock_envelope_index(&envelope_path).await.unwrap();

    let mut db = MailDatabase::new(tmp.path().join("swiftea.db"));
    db.initialize().await.unwrap();
    Fixture {
        _tmp: tmp,
        envelope_path,
        db,
    }
}

#[tokio::test]
async fn bulk_copy_counts_and_idempotence() {
    let mut fx = fixture().await;

    fx.db.attach_envelope_index(&fx.envelope_path).await.unwrap();
    let first = fx.db.perform_bulk_copy().await.unwrap();
    assert_eq!(first.message_count, MESSAGES as u64);
    assert_eq!(first.mailbox_count, MAILBOXES as u64);
    assert_eq!(first.address_count, ADDRESSES as u64);
    assert_eq!(
        first.total_count,
        (MESSAGES + MAILBOXES + ADDRESSES) as u64
    );

    let ids_before = canonical_ids(&fx.db).await;
    assert_eq!(ids_before.len(), MESSAGES as usize);

    // Re-running against the same upstream changes nothing.
    let second = fx.db.perform_bulk_copy().await.unwrap();
    assert_eq!(second.message_count, first.message_count);
    assert_eq!(fx.db.message_count().await.unwrap(), MESSAGES);
    assert_eq!(fx.db.mailbox_count().await.unwrap(), MAILBOXES);
    assert_eq!(canonical_ids(&fx.db).await, ids_before);

    fx.db.detach_envelope_index().await.unwrap();
    fx.db.close().await;
}

#[tokio::test]
async fn projection_maps_upstream_columns() {
    let mut fx = fixture().await;
    fx.db.attach_envelope_index(&fx.envelope_path).await.unwrap();
    fx.db.perform_bulk_copy().await.unwrap();

    // Message 0 lives in the inbox mailbox and was unread.
    let msg = fx.db.get_message(1).await.unwrap().expect("rowid 1 copied");
    assert_eq!(msg.subject.as_deref(), Some("Subject number 0"));
    assert_eq!(msg.sender_email.as_deref(), Some("sender0@example.com"));
    // Empty upstream comment normalizes to a null sender name.
    assert_eq!(msg.sender_name, None);
    assert_eq!(msg.mailbox_name.as_deref(), Some("inbox"));
    assert_eq!(msg.date_received, Some(1_690_000_000));
    assert!(!msg.is_read);
    assert!(!msg.is_flagged);
    assert_eq!(msg.message_id.as_deref(), Some("<msg0@example.com>"));

    let mailboxes = fx.db.get_mailboxes().await.unwrap();
    assert_eq!(mailboxes.len(), MAILBOXES as usize);
    assert!(mailboxes.iter().all(|mb| mb.account_id.as_deref() == Some("acct-1")));

    let address = fx.db.get_address(1).await.unwrap().unwrap();
    assert_eq!(address.address.as_deref(), Some("sender0@example.com"));
    assert_eq!(address.comment, None);
}

#[tokio::test]
async fn local_deletion_survives_reingestion() {
    let mut fx = fixture().await;
    fx.db.attach_envelope_index(&fx.envelope_path).await.unwrap();
    fx.db.perform_bulk_copy().await.unwrap();

    let mut msg = fx.db.get_message(42).await.unwrap().unwrap();
    msg.is_deleted = true;
    fx.db.upsert_message(&msg).await.unwrap();

    fx.db.perform_bulk_copy().await.unwrap();
    let after = fx.db.get_message(42).await.unwrap().unwrap();
    assert!(after.is_deleted, "bulk copy must not resurrect deletions");
}

#[tokio::test]
async fn attach_slot_is_a_singleton() {
    let mut fx = fixture().await;

    let err = fx.db.perform_bulk_copy().await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotAttached));

    fx.db.attach_envelope_index(&fx.envelope_path).await.unwrap();
    let err = fx
        .db
        .attach_envelope_index(&fx.envelope_path)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::AlreadyAttached));

    fx.db.detach_envelope_index().await.unwrap();
    let err = fx.db.detach_envelope_index().await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotAttached));
}

#[tokio::test]
async fn attach_requires_initialized_database_and_existing_file() {
    let tmp = TempDir::new().unwrap();

    let mut uninitialized = MailDatabase::new(tmp.path().join("db.sqlite"));
    let err = uninitialized
        .attach_envelope_index(Path::new("/nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::NotInitialized));

    let mut db = MailDatabase::new(tmp.path().join("db.sqlite"));
    db.initialize().await.unwrap();
    let err = db
        .attach_envelope_index(&tmp.path().join("missing Envelope Index"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::QueryFailed { .. }));
}

#[tokio::test]
async fn upstream_presence_and_status_checks() {
    let mut fx = fixture().await;
    fx.db.attach_envelope_index(&fx.envelope_path).await.unwrap();

    let present = fx
        .db
        .envelope_rowids_present(&[1, 2, MESSAGES + 500])
        .await
        .unwrap();
    assert_eq!(present, vec![1, 2]);

    let status = fx.db.envelope_message_status(&[1, 2]).await.unwrap();
    assert_eq!(status.len(), 2);
    assert!(!status[0].is_read);
    assert!(status[1].is_read);
    assert!(!status[0].is_flagged);
}
