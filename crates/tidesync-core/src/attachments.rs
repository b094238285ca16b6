//! Attachment lifecycle helpers shared by every [`BlobStore`].
//!
//! Thumbnail derivation is best-effort: a payload that cannot be decoded
//! is stored without a thumbnail rather than failing the save.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::models::{Attachment, Collection};
use crate::store::{BlobStore, RecordStore};

/// Longest edge of a derived thumbnail, in pixels.
pub const THUMBNAIL_MAX_EDGE: u32 = 200;

/// Produces a bounded-size preview image for an image payload.
pub trait Thumbnailer: Send + Sync {
    fn thumbnail(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<u8>>;
}

/// Derive a thumbnail for `attachment` if it is an image without one.
pub fn attach_thumbnail(attachment: &mut Attachment, thumbnailer: Option<&Arc<dyn Thumbnailer>>) {
    if !attachment.is_image() || attachment.thumbnail.is_some() {
        return;
    }
    let Some(thumbnailer) = thumbnailer else {
        return;
    };
    match thumbnailer.thumbnail(&attachment.blob, &attachment.mime_type) {
        Ok(thumb) => {
            debug!(
                attachment = %attachment.id,
                bytes = thumb.len(),
                "derived thumbnail"
            );
            attachment.thumbnail = Some(thumb);
        }
        Err(err) => {
            warn!(
                attachment = %attachment.id,
                mime = %attachment.mime_type,
                error = %err,
                "thumbnail generation failed; storing without thumbnail"
            );
        }
    }
}

/// Store a new attachment after checking that its owning todo exists.
pub async fn create_attachment(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    attachment: &Attachment,
) -> Result<()> {
    if records
        .get(Collection::Todos, &attachment.todo_id)
        .await?
        .is_none()
    {
        bail!(
            "cannot attach '{}': todo {} does not exist",
            attachment.name,
            attachment.todo_id
        );
    }
    blobs.put_attachment(attachment).await
}

/// Delete a todo together with its attachments.
///
/// The stores do not cascade on their own. Attachments go first so a
/// failure part-way leaves the todo in place rather than orphaned blobs.
pub async fn delete_todo_with_attachments(
    records: &dyn RecordStore,
    blobs: &dyn BlobStore,
    todo_id: &str,
) -> Result<u64> {
    let removed = blobs.delete_attachments_by_owner(todo_id).await?;
    records.delete(Collection::Todos, todo_id).await?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, Todo};
    use crate::store::memory::InMemoryStore;
    use chrono::{TimeZone, Utc};

    struct FixedThumb;

    impl Thumbnailer for FixedThumb {
        fn thumbnail(&self, _bytes: &[u8], _mime: &str) -> Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }
    }

    struct BrokenThumb;

    impl Thumbnailer for BrokenThumb {
        fn thumbnail(&self, _bytes: &[u8], _mime: &str) -> Result<Vec<u8>> {
            bail!("unsupported image")
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_thumbnail_only_for_images() {
        let thumb: Arc<dyn Thumbnailer> = Arc::new(FixedThumb);
        let mut pdf = Attachment::new("t1", "a.pdf", "application/pdf", vec![0; 8], now());
        attach_thumbnail(&mut pdf, Some(&thumb));
        assert!(pdf.thumbnail.is_none());

        let mut png = Attachment::new("t1", "a.png", "image/png", vec![0; 8], now());
        attach_thumbnail(&mut png, Some(&thumb));
        assert_eq!(png.thumbnail, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_thumbnail_failure_keeps_attachment() {
        let thumb: Arc<dyn Thumbnailer> = Arc::new(BrokenThumb);
        let mut png = Attachment::new("t1", "a.png", "image/png", vec![9; 4], now());
        attach_thumbnail(&mut png, Some(&thumb));
        assert!(png.thumbnail.is_none());
        assert_eq!(png.blob, vec![9; 4]);
    }

    #[tokio::test]
    async fn test_create_attachment_requires_owner() {
        let store = InMemoryStore::new();
        let orphan = Attachment::new("missing", "x.txt", "text/plain", b"hi".to_vec(), now());
        assert!(create_attachment(&store, &store, &orphan).await.is_err());

        let todo = Todo::new("u1", "with file", now());
        store
            .put(Collection::Todos, &Record::Todo(todo.clone()))
            .await
            .unwrap();
        let owned = Attachment::new(&todo.id, "x.txt", "text/plain", b"hi".to_vec(), now());
        create_attachment(&store, &store, &owned).await.unwrap();
        assert!(store.get_attachment(&owned.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_todo_cascades_attachments() {
        let store = InMemoryStore::new();
        let todo = Todo::new("u1", "t", now());
        store
            .put(Collection::Todos, &Record::Todo(todo.clone()))
            .await
            .unwrap();
        for name in ["a.txt", "b.txt"] {
            let att = Attachment::new(&todo.id, name, "text/plain", vec![1], now());
            create_attachment(&store, &store, &att).await.unwrap();
        }

        let removed = delete_todo_with_attachments(&store, &store, &todo.id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store
            .get(Collection::Todos, &todo.id)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_attachments_by_owner(&todo.id)
            .await
            .unwrap()
            .is_empty());
    }
}
