//! In-process remote backend for tests and replica simulations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::{sort_records, Collection, Record};

use super::{Principal, RemoteAdapter};

#[derive(Default)]
struct Tables {
    rows: HashMap<Collection, HashMap<String, Record>>,
    fail_upsert: Option<SyncError>,
    fail_fetch: Option<SyncError>,
    upsert_calls: usize,
    fetch_calls: usize,
}

/// A remote table set held in memory. Share one instance (behind an
/// `Arc`) between several orchestrators to simulate replicas.
#[derive(Default)]
pub struct InMemoryRemote {
    tables: Mutex<Tables>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every upsert fail with `err` until cleared with `None`.
    pub fn fail_upserts(&self, err: Option<SyncError>) {
        self.lock().fail_upsert = err;
    }

    /// Make every fetch fail with `err` until cleared with `None`.
    pub fn fail_fetches(&self, err: Option<SyncError>) {
        self.lock().fail_fetch = err;
    }

    /// Write a row directly, as another client would.
    pub fn seed(&self, record: Record) {
        let mut tables = self.lock();
        tables
            .rows
            .entry(record.collection())
            .or_default()
            .insert(record.id().to_string(), record);
    }

    /// Delete a row directly, as another client would.
    pub fn remove(&self, collection: Collection, id: &str) {
        if let Some(rows) = self.lock().rows.get_mut(&collection) {
            rows.remove(id);
        }
    }

    /// Rows in `collection` regardless of owner, in canonical order.
    pub fn rows(&self, collection: Collection) -> Vec<Record> {
        let tables = self.lock();
        let mut out: Vec<Record> = tables
            .rows
            .get(&collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        sort_records(&mut out);
        out
    }

    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }
}

#[async_trait]
impl RemoteAdapter for InMemoryRemote {
    async fn upsert(
        &self,
        collection: Collection,
        records: &[Record],
        principal: &Principal,
    ) -> Result<(), SyncError> {
        let mut tables = self.lock();
        tables.upsert_calls += 1;
        if let Some(err) = tables.fail_upsert.clone() {
            return Err(err);
        }
        if let Some(bad) = records.iter().find(|r| r.collection() != collection) {
            return Err(SyncError::Remote {
                status: 400,
                message: format!("record {} does not belong to {}", bad.id(), collection),
            });
        }
        let rows = tables.rows.entry(collection).or_default();
        for record in records {
            let mut row = record.clone();
            row.set_user_id(&principal.user_id);
            rows.insert(row.id().to_string(), row);
        }
        Ok(())
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        principal: &Principal,
    ) -> Result<Vec<Record>, SyncError> {
        let mut tables = self.lock();
        tables.fetch_calls += 1;
        if let Some(err) = tables.fail_fetch.clone() {
            return Err(err);
        }
        let mut out: Vec<Record> = tables
            .rows
            .get(&collection)
            .map(|rows| {
                rows.values()
                    .filter(|r| r.user_id() == principal.user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        sort_records(&mut out);
        Ok(out)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
