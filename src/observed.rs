//! Change feed over a [`RecordStore`].
//!
//! [`ObservedStore`] forwards every call to the wrapped store and, after a
//! successful `put` or `delete`, broadcasts a [`RecordChanged`]. The
//! scheduler subscribes to debounce syncs. The orchestrator writes through
//! the bare store, so its own pull write-backs never re-arm a debounce.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use tidesync_core::models::{Collection, Record, RecordChanged};
use tidesync_core::store::RecordStore;

const CHANNEL_CAPACITY: usize = 256;

pub struct ObservedStore {
    inner: Arc<dyn RecordStore>,
    tx: broadcast::Sender<RecordChanged>,
}

impl ObservedStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { inner, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordChanged> {
        self.tx.subscribe()
    }

    pub fn inner(&self) -> &Arc<dyn RecordStore> {
        &self.inner
    }

    fn emit(&self, change: RecordChanged) {
        // No subscribers is fine.
        let _ = self.tx.send(change);
    }
}

#[async_trait]
impl RecordStore for ObservedStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        self.inner.get(collection, id).await
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        self.inner.get_all(collection).await
    }

    async fn put(&self, collection: Collection, record: &Record) -> Result<()> {
        self.inner.put(collection, record).await?;
        self.emit(RecordChanged {
            collection,
            id: record.id().to_string(),
            updated_at: Some(record.updated_at()),
        });
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.inner.delete(collection, id).await?;
        self.emit(RecordChanged {
            collection,
            id: id.to_string(),
            updated_at: None,
        });
        Ok(())
    }
}
