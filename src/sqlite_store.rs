//! SQLite-backed implementation of the storage traits.
//!
//! One [`SqliteStore`] serves all four traits over a single pool:
//! records live in `records` as JSON payloads, attachments in
//! `attachments`, and the ledger and settings in their own tables (see
//! [`crate::migrate`]). Timestamps are stored as Unix milliseconds.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use tidesync_core::attachments::{attach_thumbnail, Thumbnailer};
use tidesync_core::models::{Attachment, Collection, Record, Settings, SyncStatus};
use tidesync_core::store::{check_put, BlobStore, RecordStore, SettingsStore, StatusLedger};

use crate::thumbnail::ImageThumbnailer;

const SETTINGS_KEY: &str = "settings";

pub struct SqliteStore {
    pool: SqlitePool,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
}

impl SqliteStore {
    /// Wrap `pool`, deriving thumbnails with [`ImageThumbnailer`].
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            thumbnailer: Some(Arc::new(ImageThumbnailer::default())),
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    pub fn without_thumbnails(mut self) -> Self {
        self.thumbnailer = None;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of records in `collection`.
    pub async fn count(&self, collection: Collection) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("timestamp out of range: {}", ms))
}

fn decode_record(collection: Collection, row: &SqliteRow) -> Result<Record> {
    let id: String = row.get("id");
    let payload: String = row.get("payload");
    Record::from_json(collection, &payload)
        .with_context(|| format!("corrupt {} record {}", collection, id))
}

fn decode_attachment(row: &SqliteRow) -> Result<Attachment> {
    let size: i64 = row.get("size");
    Ok(Attachment {
        id: row.get("id"),
        todo_id: row.get("todo_id"),
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        size: size.max(0) as u64,
        created_at: from_millis(row.get("created_at"))?,
        blob: row.get("blob"),
        thumbnail: row.get("thumbnail"),
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query("SELECT id, payload FROM records WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| decode_record(collection, &row)).transpose()
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, payload FROM records WHERE collection = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|row| decode_record(collection, row)).collect()
    }

    async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        check_put(collection, record)?;
        let payload = record.to_json()?;
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, user_id, created_at, updated_at, payload)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                user_id = excluded.user_id,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                payload = excluded.payload
            "#,
        )
        .bind(collection.as_str())
        .bind(record.id())
        .bind(record.user_id())
        .bind(to_millis(record.created_at()))
        .bind(to_millis(record.updated_at()))
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn put_attachment(&self, attachment: &Attachment) -> Result<()> {
        let mut attachment = attachment.clone();
        attach_thumbnail(&mut attachment, self.thumbnailer.as_ref());

        sqlx::query(
            r#"
            INSERT INTO attachments (id, todo_id, name, mime_type, size, created_at, blob, thumbnail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                todo_id = excluded.todo_id,
                name = excluded.name,
                mime_type = excluded.mime_type,
                size = excluded.size,
                created_at = excluded.created_at,
                blob = excluded.blob,
                thumbnail = excluded.thumbnail
            "#,
        )
        .bind(&attachment.id)
        .bind(&attachment.todo_id)
        .bind(&attachment.name)
        .bind(&attachment.mime_type)
        .bind(attachment.size as i64)
        .bind(to_millis(attachment.created_at))
        .bind(&attachment.blob)
        .bind(&attachment.thumbnail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let row = sqlx::query("SELECT * FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| decode_attachment(&row)).transpose()
    }

    async fn get_attachments_by_owner(&self, todo_id: &str) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(
            "SELECT * FROM attachments WHERE todo_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(todo_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_attachment).collect()
    }

    async fn delete_attachment(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_attachments_by_owner(&self, todo_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attachments WHERE todo_id = ?")
            .bind(todo_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl StatusLedger for SqliteStore {
    async fn get_status(&self, collection: Collection) -> Result<SyncStatus> {
        let row = sqlx::query("SELECT last_sync, pending FROM sync_status WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(SyncStatus::default());
        };
        let last_sync: Option<i64> = row.get("last_sync");
        Ok(SyncStatus {
            last_sync: last_sync.map(from_millis).transpose()?,
            pending: row.get("pending"),
        })
    }

    async fn set_pending(&self, collection: Collection, pending: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (collection, pending) VALUES (?, ?)
            ON CONFLICT(collection) DO UPDATE SET pending = excluded.pending
            "#,
        )
        .bind(collection.as_str())
        .bind(pending)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_success(&self, collection: Collection, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (collection, last_sync, pending) VALUES (?, ?, 0)
            ON CONFLICT(collection) DO UPDATE SET
                last_sync = excluded.last_sync,
                pending = 0
            "#,
        )
        .bind(collection.as_str())
        .bind(to_millis(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn load_settings(&self) -> Result<Option<Settings>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await?;
        value
            .map(|v| serde_json::from_str(&v).context("corrupt settings record"))
            .transpose()
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        settings.auto_sync.validate()?;
        let value = serde_json::to_string(settings)?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
