//! Photo Upload Orchestrator
//!
//! Uploads up to three images for one item, stores their public URLs in
//! `item_photos`, and compensates for partial failures: a blob whose
//! metadata row could not be written is deleted again, best-effort.
//!
//! The orchestrator never returns an error; every failure is reported
//! through the `errors` list of the outcome, and one file's failure never
//! aborts processing of the files after it. Files are handled strictly in
//! input order so the indexed error messages line up with the selection.

use crate::items::decode;
use crate::model::ItemPhoto;
use crate::store::{Backend, ObjectStore, RelationalStore, UploadOptions};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const ITEM_PHOTOS_TABLE: &str = "item_photos";

/// At most this many photos are stored per upload call.
pub const MAX_PHOTOS_PER_ITEM: usize = 3;

/// Bucket used when the caller does not name one.
pub const DEFAULT_PHOTO_BUCKET: &str = "item-photos";

/// One image selected for upload.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    /// Original filename; its suffix decides the stored extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    /// Extension from the filename's suffix, defaulting to `jpg`.
    fn extension(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or("jpg")
    }
}

/// What an upload call produced: successfully stored photos and
/// human-readable error messages, in input order.
#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub photos: Vec<ItemPhoto>,
    pub errors: Vec<String>,
}

impl UploadOutcome {
    fn rejected(message: impl Into<String>) -> Self {
        Self { photos: Vec::new(), errors: vec![message.into()] }
    }
}

pub struct PhotoUploader {
    tables: Arc<dyn RelationalStore>,
    objects: Arc<dyn ObjectStore>,
}

impl PhotoUploader {
    pub fn new(backend: &Backend) -> Self {
        Self {
            tables: backend.tables.clone(),
            objects: backend.objects.clone(),
        }
    }

    /// Upload photos for `item_id` into `bucket`.
    ///
    /// Only the first [`MAX_PHOTOS_PER_ITEM`] files are processed; a notice
    /// is appended to the errors when the selection was longer. Each file
    /// is stored under a fresh `{item_id}/{uuid}.{ext}` path without
    /// overwrite, then recorded in `item_photos` with its public URL.
    pub async fn upload(
        &self,
        item_id: Option<Uuid>,
        mut files: Vec<PhotoFile>,
        bucket: &str,
    ) -> UploadOutcome {
        let Some(item_id) = item_id else {
            return UploadOutcome::rejected("Missing itemId.");
        };

        let total = files.len();
        files.truncate(MAX_PHOTOS_PER_ITEM);
        if files.is_empty() {
            return UploadOutcome::rejected("Please select at least one image.");
        }

        let mut outcome = UploadOutcome::default();
        for (index, file) in files.into_iter().enumerate() {
            let label = index + 1;
            let path = format!("{item_id}/{}.{}", Uuid::new_v4(), file.extension());
            debug!(%item_id, %path, "uploading photo");

            if let Err(e) = self
                .objects
                .upload(bucket, &path, file.bytes, &UploadOptions::default())
                .await
            {
                outcome.errors.push(format!("Image {label}: {e}"));
                continue;
            }

            let image_url = self.objects.public_url(bucket, &path);
            let inserted = self
                .tables
                .insert(
                    ITEM_PHOTOS_TABLE,
                    serde_json::json!({ "item_id": item_id, "image_url": image_url }),
                )
                .await;

            match inserted {
                Err(e) => {
                    outcome.errors.push(format!("Image {label}: {e}"));
                    // The blob is already stored; remove it so no orphan
                    // outlives the failed metadata write. Its own failure
                    // must not mask the primary error.
                    if let Err(cleanup) = self.objects.remove(bucket, &[path.clone()]).await {
                        warn!(%path, error = %cleanup, "failed to remove orphaned photo blob");
                    }
                }
                Ok(row) => match decode::<ItemPhoto>("failed to record photo", row) {
                    Ok(photo) => outcome.photos.push(photo),
                    // The row persisted but came back malformed; report it
                    // without touching the blob it references.
                    Err(e) => outcome.errors.push(format!("Image {label}: {e}")),
                },
            }
        }

        if total > MAX_PHOTOS_PER_ITEM {
            outcome.errors.push(format!(
                "Only the first {MAX_PHOTOS_PER_ITEM} images were processed."
            ));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn files(names: &[&str]) -> Vec<PhotoFile> {
        names
            .iter()
            .map(|name| PhotoFile::new(*name, vec![0u8; 4]))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_item_id_short_circuits() {
        let store = MemoryBackend::new();
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(None, files(&["a.jpg", "b.jpg"]), DEFAULT_PHOTO_BUCKET)
            .await;
        assert!(outcome.photos.is_empty());
        assert_eq!(outcome.errors, vec!["Missing itemId."]);
        assert_eq!(store.collaborator_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_selection_short_circuits() {
        let store = MemoryBackend::new();
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(Some(Uuid::new_v4()), Vec::new(), DEFAULT_PHOTO_BUCKET)
            .await;
        assert!(outcome.photos.is_empty());
        assert_eq!(outcome.errors, vec!["Please select at least one image."]);
        assert_eq!(store.collaborator_calls(), 0);
    }

    #[tokio::test]
    async fn test_uploads_and_records_each_file() {
        let store = MemoryBackend::new();
        let uploader = PhotoUploader::new(&store.backend());
        let item_id = Uuid::new_v4();

        let outcome = uploader
            .upload(Some(item_id), files(&["a.jpg", "b.png"]), DEFAULT_PHOTO_BUCKET)
            .await;
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.photos.len(), 2);
        assert_eq!(store.blob_count(), 2);

        for photo in &outcome.photos {
            assert_eq!(photo.item_id, item_id);
            assert!(photo.image_url.starts_with("memory://item-photos/"));
        }
        // Paths are namespaced by item and keep each file's extension.
        let mut paths = store.blob_paths(DEFAULT_PHOTO_BUCKET);
        paths.sort();
        assert!(paths.iter().all(|p| p.starts_with(&item_id.to_string())));
        assert!(paths.iter().any(|p| p.ends_with(".jpg")));
        assert!(paths.iter().any(|p| p.ends_with(".png")));
    }

    #[tokio::test]
    async fn test_extension_defaults_to_jpg() {
        let store = MemoryBackend::new();
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(Some(Uuid::new_v4()), files(&["bare"]), DEFAULT_PHOTO_BUCKET)
            .await;
        assert_eq!(outcome.photos.len(), 1);
        assert!(outcome.photos[0].image_url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_per_file_failures_are_independent() {
        let store = MemoryBackend::new();
        // First and third upload calls fail; five files truncate to three.
        store.fail_upload_calls(&[1, 3]);
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(
                Some(Uuid::new_v4()),
                files(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]),
                DEFAULT_PHOTO_BUCKET,
            )
            .await;

        assert_eq!(outcome.photos.len(), 1);
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome.errors[0].starts_with("Image 1:"));
        assert!(outcome.errors[1].starts_with("Image 3:"));
        assert_eq!(outcome.errors[2], "Only the first 3 images were processed.");
    }

    #[tokio::test]
    async fn test_truncation_notice_is_appended_even_when_all_succeed() {
        let store = MemoryBackend::new();
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(
                Some(Uuid::new_v4()),
                files(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]),
                DEFAULT_PHOTO_BUCKET,
            )
            .await;
        assert_eq!(outcome.photos.len(), 3);
        assert_eq!(
            outcome.errors,
            vec!["Only the first 3 images were processed."]
        );
        assert_eq!(store.blob_count(), 3);
    }

    #[tokio::test]
    async fn test_metadata_failure_removes_orphaned_blob() {
        let store = MemoryBackend::new();
        store.fail_inserts_into("item_photos");
        let uploader = PhotoUploader::new(&store.backend());

        let outcome = uploader
            .upload(Some(Uuid::new_v4()), files(&["a.jpg"]), DEFAULT_PHOTO_BUCKET)
            .await;

        assert!(outcome.photos.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Image 1:"));
        // Compensating delete removed the blob that had no metadata row.
        assert_eq!(store.blob_count(), 0);
        assert_eq!(store.removed_paths().len(), 1);
    }
}
