//! Core data models used throughout tidesync.
//!
//! These types represent the records, attachments, and sync bookkeeping
//! that flow between the local stores, the merge engine, and the remote
//! system of record.
//!
//! Records are a closed sum type ([`Record`]) over the two synced kinds,
//! [`Todo`] and [`KnowledgeItem`]. Both kinds serialize to the flat,
//! snake_case row shape used by the remote tables, so the same serde
//! derive serves local persistence and the wire.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::clock::truncate_millis;

/// One of the independently synced record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Todos,
    Knowledge,
}

impl Collection {
    /// Every collection, in sync order.
    pub const ALL: [Collection; 2] = [Collection::Todos, Collection::Knowledge];

    /// Local name, used for ledger keys and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Todos => "todos",
            Collection::Knowledge => "knowledge",
        }
    }

    /// Name of the remote table backing this collection.
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Todos => "todos",
            Collection::Knowledge => "knowledge_items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todos" | "todo" => Ok(Collection::Todos),
            "knowledge" | "knowledge_items" | "notes" | "note" => Ok(Collection::Knowledge),
            other => bail!("Unknown collection: '{}'. Must be todos or knowledge.", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => bail!("Unknown priority: '{}'. Must be low, medium, or high.", other),
        }
    }
}

/// Processing state of a knowledge item.
///
/// Items become `Ready` once their content has been captured; AI
/// summarization and embedding run after that point, outside the sync
/// core, which never waits on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

/// Read `null` as the field's default. Remote tables hold `null` in
/// empty nullable columns (`text[]`, `text`, `boolean`).
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A TODO entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// Knowledge item this todo was captured from, if any.
    #[serde(default)]
    pub knowledge_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(user_id: &str, title: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: None,
            completed: false,
            priority: Priority::default(),
            due_date: None,
            tags: Vec::new(),
            knowledge_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A saved page or note in the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: KnowledgeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    pub fn new(user_id: &str, title: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            url: None,
            content: String::new(),
            summary: None,
            keywords: Vec::new(),
            status: KnowledgeStatus::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A synced record of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Todo(Todo),
    Knowledge(KnowledgeItem),
}

impl Record {
    pub fn collection(&self) -> Collection {
        match self {
            Record::Todo(_) => Collection::Todos,
            Record::Knowledge(_) => Collection::Knowledge,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Todo(t) => &t.id,
            Record::Knowledge(k) => &k.id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Record::Todo(t) => &t.user_id,
            Record::Knowledge(k) => &k.user_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Record::Todo(t) => t.created_at,
            Record::Knowledge(k) => k.created_at,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Record::Todo(t) => t.updated_at,
            Record::Knowledge(k) => k.updated_at,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Record::Todo(t) => &t.title,
            Record::Knowledge(k) => &k.title,
        }
    }

    /// Mark the record as mutated at `now`.
    ///
    /// `updated_at` never moves backwards, even if the clock does.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let updated_at = match self {
            Record::Todo(t) => &mut t.updated_at,
            Record::Knowledge(k) => &mut k.updated_at,
        };
        if now > *updated_at {
            *updated_at = now;
        }
    }

    /// Reassign the owning principal.
    pub fn set_user_id(&mut self, user_id: &str) {
        match self {
            Record::Todo(t) => t.user_id = user_id.to_string(),
            Record::Knowledge(k) => k.user_id = user_id.to_string(),
        }
    }

    /// Check the record-level invariants: non-empty id and
    /// `updated_at >= created_at`.
    pub fn validate(&self) -> Result<()> {
        if self.id().trim().is_empty() {
            bail!("{} record has an empty id", self.collection());
        }
        if self.updated_at() < self.created_at() {
            bail!(
                "{} record {} has updated_at before created_at",
                self.collection(),
                self.id()
            );
        }
        Ok(())
    }

    /// Serialize to the flat row shape shared by local payloads and the
    /// remote tables.
    pub fn to_row(&self) -> Result<serde_json::Value> {
        let value = match self {
            Record::Todo(t) => serde_json::to_value(t)?,
            Record::Knowledge(k) => serde_json::to_value(k)?,
        };
        Ok(value)
    }

    /// Decode a flat row belonging to `collection`.
    ///
    /// Timestamps are truncated to whole milliseconds, the precision the
    /// local store orders and compares by.
    pub fn from_row(collection: Collection, row: serde_json::Value) -> Result<Self> {
        let mut record = match collection {
            Collection::Todos => Record::Todo(serde_json::from_value(row)?),
            Collection::Knowledge => Record::Knowledge(serde_json::from_value(row)?),
        };
        record.truncate_timestamps();
        Ok(record)
    }

    fn truncate_timestamps(&mut self) {
        match self {
            Record::Todo(t) => {
                t.created_at = truncate_millis(t.created_at);
                t.updated_at = truncate_millis(t.updated_at);
                t.due_date = t.due_date.map(truncate_millis);
            }
            Record::Knowledge(k) => {
                k.created_at = truncate_millis(k.created_at);
                k.updated_at = truncate_millis(k.updated_at);
            }
        }
    }

    /// Decode a JSON-encoded row belonging to `collection`.
    pub fn from_json(collection: Collection, json: &str) -> Result<Self> {
        let record = match collection {
            Collection::Todos => Record::Todo(serde_json::from_str(json)?),
            Collection::Knowledge => Record::Knowledge(serde_json::from_str(json)?),
        };
        Ok(record)
    }

    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Record::Todo(t) => serde_json::to_string(t)?,
            Record::Knowledge(k) => serde_json::to_string(k)?,
        };
        Ok(json)
    }
}

impl From<Todo> for Record {
    fn from(todo: Todo) -> Self {
        Record::Todo(todo)
    }
}

impl From<KnowledgeItem> for Record {
    fn from(item: KnowledgeItem) -> Self {
        Record::Knowledge(item)
    }
}

/// Canonical ordering for record listings: newest `created_at` first,
/// ties broken by ascending id.
pub fn sort_records(records: &mut [Record]) {
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.id().cmp(b.id()))
    });
}

/// Generate a fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A binary attachment owned by a [`Todo`].
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub id: String,
    /// Owning todo id.
    pub todo_id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub blob: Vec<u8>,
    pub thumbnail: Option<Vec<u8>>,
}

impl Attachment {
    pub fn new(todo_id: &str, name: &str, mime_type: &str, blob: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            todo_id: todo_id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size: blob.len() as u64,
            created_at: now,
            blob,
            thumbnail: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Per-collection sync bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    /// A sync attempt is owed but has not run yet.
    pub pending: bool,
}

/// Automatic sync trigger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSyncConfig {
    pub enabled: bool,
    /// Spacing of the periodic trigger.
    pub interval_minutes: u32,
    /// Quiet period after a local write before syncing.
    pub debounce_seconds: u32,
    pub sync_on_network_restore: bool,
}

impl Default for AutoSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 5,
            debounce_seconds: 10,
            sync_on_network_restore: true,
        }
    }
}

impl AutoSyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            bail!("auto_sync.interval_minutes must be >= 1");
        }
        Ok(())
    }

    pub fn interval_ms(&self) -> u64 {
        u64::from(self.interval_minutes) * 60_000
    }

    pub fn debounce_ms(&self) -> u64 {
        u64::from(self.debounce_seconds) * 1_000
    }
}

/// The persisted settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub auto_sync: AutoSyncConfig,
}

/// Emitted by the record store on every local write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChanged {
    pub collection: Collection,
    pub id: String,
    /// New `updated_at`, or `None` for a deletion.
    pub updated_at: Option<DateTime<Utc>>,
}
