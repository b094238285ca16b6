//! Storage abstraction for tidesync.
//!
//! Four traits split the local persistence surface along the lines the
//! sync engine uses it:
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`RecordStore`] | Todos and knowledge items, keyed by collection + id |
//! | [`BlobStore`] | Attachments, keyed by id with lookup by owning todo |
//! | [`StatusLedger`] | Per-collection `last_sync` / `pending` bookkeeping |
//! | [`SettingsStore`] | The persisted settings record |
//!
//! Every operation is durable before it returns; there is no write-behind
//! layer. Single-record writes are atomic, but nothing here offers
//! cross-record transactions: a pull that rewrites five records performs
//! five independent writes.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Attachment, Collection, Record, Settings, SyncStatus};

/// Durable key-value store of synced records.
///
/// Concurrent writers to the same id resolve last-writer-wins at this
/// layer. Callers own `updated_at` and must bump it on every mutation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// All records in `collection`, ordered by `created_at` desc, then id.
    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>>;

    /// Insert or overwrite by id.
    ///
    /// Fails if the record belongs to a different collection or violates
    /// the record invariants.
    async fn put(&self, collection: Collection, record: &Record) -> Result<()>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;
}

/// Durable store of binary attachments.
///
/// Independent of the record sync cycle. Deleting a todo does not cascade
/// here; see [`crate::attachments::delete_todo_with_attachments`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Insert or overwrite by id. For image payloads without a thumbnail
    /// the store derives one on a best-effort basis.
    async fn put_attachment(&self, attachment: &Attachment) -> Result<()>;

    async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>>;

    /// Attachments owned by `todo_id`, oldest first.
    async fn get_attachments_by_owner(&self, todo_id: &str) -> Result<Vec<Attachment>>;

    async fn delete_attachment(&self, id: &str) -> Result<()>;

    /// Returns the number of attachments removed.
    async fn delete_attachments_by_owner(&self, todo_id: &str) -> Result<u64>;
}

/// Per-collection sync status.
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Status for `collection`; the default when nothing was recorded yet.
    async fn get_status(&self, collection: Collection) -> Result<SyncStatus>;

    async fn set_pending(&self, collection: Collection, pending: bool) -> Result<()>;

    /// Record a confirmed successful push or pull.
    async fn record_success(&self, collection: Collection, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> Result<Option<Settings>>;

    async fn save_settings(&self, settings: &Settings) -> Result<()>;
}

/// Shared `put` precondition for every [`RecordStore`] implementation.
pub fn check_put(collection: Collection, record: &Record) -> Result<()> {
    if record.collection() != collection {
        anyhow::bail!(
            "record {} is a {} record, not {}",
            record.id(),
            record.collection(),
            collection
        );
    }
    record.validate()
}
