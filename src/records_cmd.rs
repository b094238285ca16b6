//! Local record and attachment commands.
//!
//! Every mutation sets `updated_at` from the injected clock. The helpers
//! take trait objects so the interactive session can route writes through
//! an [`ObservedStore`](crate::observed::ObservedStore).

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use tidesync_core::attachments::{create_attachment, delete_todo_with_attachments};
use tidesync_core::clock::Clock;
use tidesync_core::models::{Attachment, Collection, KnowledgeItem, Priority, Record, Todo};
use tidesync_core::store::{BlobStore, RecordStore};

#[derive(Debug, Clone, Default)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl NewTodo {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}

pub async fn add_todo(
    records: &dyn RecordStore,
    clock: &dyn Clock,
    owner: &str,
    new: NewTodo,
) -> Result<Todo> {
    if new.title.trim().is_empty() {
        bail!("todo title must not be empty");
    }
    let mut todo = Todo::new(owner, new.title.trim(), clock.now());
    todo.description = new.description;
    todo.priority = new.priority;
    todo.due_date = new.due_date;
    todo.tags = new.tags;
    records
        .put(Collection::Todos, &Record::Todo(todo.clone()))
        .await?;
    Ok(todo)
}

pub async fn complete_todo(records: &dyn RecordStore, clock: &dyn Clock, id: &str) -> Result<Todo> {
    let Some(mut record) = records.get(Collection::Todos, id).await? else {
        bail!("todo not found: {}", id);
    };
    if let Record::Todo(todo) = &mut record {
        todo.completed = true;
    }
    record.touch(clock.now());
    records.put(Collection::Todos, &record).await?;
    match record {
        Record::Todo(todo) => Ok(todo),
        Record::Knowledge(_) => bail!("record {} is not a todo", id),
    }
}

pub async fn add_note(
    records: &dyn RecordStore,
    clock: &dyn Clock,
    owner: &str,
    title: &str,
    url: Option<String>,
    content: Option<String>,
) -> Result<KnowledgeItem> {
    if title.trim().is_empty() {
        bail!("note title must not be empty");
    }
    let mut item = KnowledgeItem::new(owner, title.trim(), clock.now());
    item.url = url;
    item.content = content.unwrap_or_default();
    records
        .put(Collection::Knowledge, &Record::Knowledge(item.clone()))
        .await?;
    Ok(item)
}

/// Delete a record. Removing a todo also removes its attachments; the
/// return value is the number of attachments removed.
pub async fn remove_record(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    collection: Collection,
    id: &str,
) -> Result<u64> {
    if records.get(collection, id).await?.is_none() {
        bail!("{} record not found: {}", collection, id);
    }
    match collection {
        Collection::Todos => delete_todo_with_attachments(records, blobs, id).await,
        Collection::Knowledge => {
            records.delete(collection, id).await?;
            Ok(0)
        }
    }
}

pub async fn attach_file(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    clock: &dyn Clock,
    todo_id: &str,
    path: &Path,
    mime_type: Option<String>,
) -> Result<Attachment> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let mime_type = mime_type.unwrap_or_else(|| guess_mime(path).to_string());

    let attachment = Attachment::new(todo_id, &name, &mime_type, bytes, clock.now());
    create_attachment(records, blobs, &attachment).await?;
    // Reload to pick up the derived thumbnail.
    Ok(blobs
        .get_attachment(&attachment.id)
        .await?
        .unwrap_or(attachment))
}

pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_due(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid due date '{}': expected YYYY-MM-DD or RFC 3339", s))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .context("invalid due date")
}

pub fn format_record(record: &Record) -> String {
    let created = record.created_at().format("%Y-%m-%d %H:%M");
    match record {
        Record::Todo(todo) => {
            let mark = if todo.completed { "x" } else { " " };
            let mut line = format!("{}  {}  [{}] {}", todo.id, created, mark, todo.title);
            if let Some(due) = todo.due_date {
                line.push_str(&format!("  (due {})", due.format("%Y-%m-%d")));
            }
            if !todo.tags.is_empty() {
                line.push_str(&format!("  #{}", todo.tags.join(" #")));
            }
            line
        }
        Record::Knowledge(item) => {
            let mut line = format!("{}  {}  {}", item.id, created, item.title);
            if let Some(url) = &item.url {
                line.push_str(&format!("  <{}>", url));
            }
            line
        }
    }
}

pub async fn print_records(records: &dyn RecordStore, collection: Collection) -> Result<()> {
    let all = records.get_all(collection).await?;
    if all.is_empty() {
        println!("No {}.", collection);
        return Ok(());
    }
    for record in &all {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub async fn print_attachments(blobs: &dyn BlobStore, todo_id: &str) -> Result<()> {
    let attachments = blobs.get_attachments_by_owner(todo_id).await?;
    if attachments.is_empty() {
        println!("No attachments.");
        return Ok(());
    }
    for a in &attachments {
        let thumb = if a.thumbnail.is_some() { "  [thumbnail]" } else { "" };
        println!("{}  {}  {}  {} bytes{}", a.id, a.name, a.mime_type, a.size, thumb);
    }
    Ok(())
}
