//! Schema migrations for the local database.
//!
//! | Table | Contents |
//! |-------|----------|
//! | `records` | Every todo and knowledge item, keyed by `(collection, id)` |
//! | `attachments` | Attachment blobs and thumbnails, keyed by id, indexed by owning todo |
//! | `sync_status` | One ledger row per collection |
//! | `settings` | Persisted user settings as JSON |
//!
//! There is no foreign key from `attachments` to `records`; deleting a
//! todo's attachments is the caller's job.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Record payloads are stored as JSON; the indexed columns exist for
    // listing order and ownership filters.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attachments (
            id TEXT PRIMARY KEY,
            todo_id TEXT NOT NULL,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            blob BLOB NOT NULL,
            thumbnail BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_status (
            collection TEXT PRIMARY KEY,
            last_sync INTEGER,
            pending INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_listing ON records(collection, created_at DESC, id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_todo_id ON attachments(todo_id)")
        .execute(pool)
        .await?;

    Ok(())
}
