//! In-memory store for testing and WASM targets.
//!
//! Implements every storage trait with `HashMap`s behind
//! `std::sync::RwLock`. Nothing survives the process, so "durable before
//! returning" holds trivially.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::attachments::{attach_thumbnail, Thumbnailer};
use crate::models::{sort_records, Attachment, Collection, Record, Settings, SyncStatus};

use super::{check_put, BlobStore, RecordStore, SettingsStore, StatusLedger};

/// In-memory implementation of all four storage traits.
pub struct InMemoryStore {
    records: RwLock<HashMap<(Collection, String), Record>>,
    attachments: RwLock<HashMap<String, Attachment>>,
    status: RwLock<HashMap<Collection, SyncStatus>>,
    settings: RwLock<Option<Settings>>,
    thumbnailer: Option<Arc<dyn Thumbnailer>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            attachments: RwLock::new(HashMap::new()),
            status: RwLock::new(HashMap::new()),
            settings: RwLock::new(None),
            thumbnailer: None,
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        self.thumbnailer = Some(thumbnailer);
        self
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&(collection, id.to_string())).cloned())
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut out: Vec<Record> = records
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, r)| r.clone())
            .collect();
        sort_records(&mut out);
        Ok(out)
    }

    async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        check_put(collection, record)?;
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert((collection, record.id().to_string()), record.clone());
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.remove(&(collection, id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn put_attachment(&self, attachment: &Attachment) -> Result<()> {
        let mut attachment = attachment.clone();
        attach_thumbnail(&mut attachment, self.thumbnailer.as_ref());
        let mut attachments = self.attachments.write().map_err(poisoned)?;
        attachments.insert(attachment.id.clone(), attachment);
        Ok(())
    }

    async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let attachments = self.attachments.read().map_err(poisoned)?;
        Ok(attachments.get(id).cloned())
    }

    async fn get_attachments_by_owner(&self, todo_id: &str) -> Result<Vec<Attachment>> {
        let attachments = self.attachments.read().map_err(poisoned)?;
        let mut out: Vec<Attachment> = attachments
            .values()
            .filter(|a| a.todo_id == todo_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn delete_attachment(&self, id: &str) -> Result<()> {
        let mut attachments = self.attachments.write().map_err(poisoned)?;
        attachments.remove(id);
        Ok(())
    }

    async fn delete_attachments_by_owner(&self, todo_id: &str) -> Result<u64> {
        let mut attachments = self.attachments.write().map_err(poisoned)?;
        let before = attachments.len();
        attachments.retain(|_, a| a.todo_id != todo_id);
        Ok((before - attachments.len()) as u64)
    }
}

#[async_trait]
impl StatusLedger for InMemoryStore {
    async fn get_status(&self, collection: Collection) -> Result<SyncStatus> {
        let status = self.status.read().map_err(poisoned)?;
        Ok(status.get(&collection).copied().unwrap_or_default())
    }

    async fn set_pending(&self, collection: Collection, pending: bool) -> Result<()> {
        let mut status = self.status.write().map_err(poisoned)?;
        status.entry(collection).or_default().pending = pending;
        Ok(())
    }

    async fn record_success(&self, collection: Collection, at: DateTime<Utc>) -> Result<()> {
        let mut status = self.status.write().map_err(poisoned)?;
        status.insert(
            collection,
            SyncStatus {
                last_sync: Some(at),
                pending: false,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for InMemoryStore {
    async fn load_settings(&self) -> Result<Option<Settings>> {
        Ok(*self.settings.read().map_err(poisoned)?)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        *self.settings.write().map_err(poisoned)? = Some(*settings);
        Ok(())
    }
}
