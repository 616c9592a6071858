//! Ordered-gallery reconciliation.
//!
//! An entity edit submits the desired final state of its gallery as one
//! ordered sequence mixing references to persisted images and markers for
//! fresh uploads, plus a parallel list of the uploaded files themselves.
//! [`plan`] diffs that sequence against the persisted set; the resulting
//! [`GalleryPlan`] drives the media-store writes ([`stage_uploads`]), the
//! single-transaction persistence write, and the post-commit file sweep
//! ([`sweep_removed`]).

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::media::{MediaStore, MediaStoreError};
use crate::storage::images::GalleryWrite;
use crate::storage::models::ImageRecord;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(
        "ordered_images declares {declared} new image(s) but {supplied} file(s) were uploaded"
    )]
    PayloadCountMismatch { declared: usize, supplied: usize },
    #[error("failed to store uploaded image: {0}")]
    Upload(#[from] MediaStoreError),
}

/// One slot of the submitted final gallery state. Sequence order is
/// authoritative and becomes each image's `position`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DesiredImage {
    /// Keep a persisted image, possibly with new author/thumbnail values.
    Existing {
        id: String,
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        thumbnail: bool,
    },
    /// A fresh upload; the binary arrives in the parallel `new_images` list.
    New {
        #[serde(default)]
        author: Option<String>,
        #[serde(default)]
        thumbnail: bool,
    },
}

/// A fresh upload pulled out of the multipart submission
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// A slot in the desired sequence that needs a fresh upload. `payload_index`
/// points into the parallel upload list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImageSlot {
    pub position: u32,
    pub payload_index: usize,
    pub author: Option<String>,
    pub thumbnail: bool,
}

/// The computed diff between the persisted gallery and the desired sequence
#[derive(Debug, Default)]
pub struct GalleryPlan {
    /// Persisted records that survive, carrying their new position, author,
    /// and thumbnail flag
    pub updates: Vec<ImageRecord>,
    /// Slots to be filled by fresh uploads
    pub creates: Vec<NewImageSlot>,
    /// Persisted records omitted from the desired sequence; their rows and
    /// backing files go away
    pub deletes: Vec<ImageRecord>,
    /// Submitted existing ids that match no persisted record. They are
    /// dropped from the gallery without error; callers log them.
    pub skipped: Vec<String>,
}

impl GalleryPlan {
    /// Combine the surviving updates with freshly staged records into the
    /// write set handed to the storage layer.
    pub fn write_set(&self, created: Vec<ImageRecord>) -> GalleryWrite {
        let mut upserts = self.updates.clone();
        upserts.extend(created);
        GalleryWrite {
            upserts,
            removals: self.deletes.iter().map(|r| r.id.clone()).collect(),
        }
    }
}

/// Diff the persisted image set against the submitted desired sequence.
///
/// Pure: no I/O is performed and no side effect is staged until the caller
/// acts on the returned plan. Fails before anything else if the number of
/// `New` slots disagrees with the number of uploaded files, in either
/// direction. Thumbnail flags are taken verbatim; positions are exactly the
/// submitted sequence indexes, with no de-duplication or gap-filling.
pub fn plan(
    existing: &[ImageRecord],
    desired: &[DesiredImage],
    supplied_payloads: usize,
) -> Result<GalleryPlan, GalleryError> {
    let declared = desired
        .iter()
        .filter(|entry| matches!(entry, DesiredImage::New { .. }))
        .count();
    if declared != supplied_payloads {
        return Err(GalleryError::PayloadCountMismatch {
            declared,
            supplied: supplied_payloads,
        });
    }

    let by_id: HashMap<&str, &ImageRecord> =
        existing.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut kept: HashSet<&str> = HashSet::new();

    let mut result = GalleryPlan::default();
    // New-file payloads are consumed in the relative order their slots
    // appear, via this independent counter into the parallel upload list.
    let mut next_payload = 0usize;

    for (i, entry) in desired.iter().enumerate() {
        let position = i as u32;
        match entry {
            DesiredImage::Existing {
                id,
                author,
                thumbnail,
            } => match by_id.get(id.as_str()) {
                Some(record) => {
                    kept.insert(record.id.as_str());
                    let mut updated = (*record).clone();
                    updated.position = position;
                    updated.author = author.clone();
                    updated.thumbnail = *thumbnail;
                    result.updates.push(updated);
                }
                // Stale or foreign reference: dropped, never created
                None => result.skipped.push(id.clone()),
            },
            DesiredImage::New { author, thumbnail } => {
                result.creates.push(NewImageSlot {
                    position,
                    payload_index: next_payload,
                    author: author.clone(),
                    thumbnail: *thumbnail,
                });
                next_payload += 1;
            }
        }
    }

    result.deletes = existing
        .iter()
        .filter(|r| !kept.contains(r.id.as_str()))
        .cloned()
        .collect();

    Ok(result)
}

/// Store the uploaded files for a plan's create slots and materialize their
/// image records, positions included.
///
/// Files are written one at a time, in slot order. The first failed write is
/// fatal: blobs already stored by this call are best-effort removed and the
/// whole edit aborts before any persistence mutation.
pub async fn stage_uploads(
    media: &dyn MediaStore,
    owner_id: &str,
    plan: &GalleryPlan,
    payloads: &[NewUpload],
) -> Result<Vec<ImageRecord>, GalleryError> {
    let mut created: Vec<ImageRecord> = Vec::with_capacity(plan.creates.len());

    for slot in &plan.creates {
        let upload = &payloads[slot.payload_index];
        let id = uuid::Uuid::new_v4().to_string();
        let storage_path = storage_path_for(&id, upload);

        if let Err(e) = media.put(&storage_path, &upload.mime_type, upload.bytes.clone()).await {
            for record in &created {
                if let Err(cleanup) = media.delete(&record.storage_path).await {
                    tracing::warn!(
                        path = %record.storage_path,
                        error = %cleanup,
                        "Failed to remove staged image after aborted upload"
                    );
                }
            }
            return Err(GalleryError::Upload(e));
        }

        created.push(ImageRecord {
            id,
            owner_id: owner_id.to_string(),
            storage_path,
            mime_type: upload.mime_type.clone(),
            byte_size: upload.bytes.len() as u64,
            author: slot.author.clone(),
            thumbnail: slot.thumbnail,
            position: slot.position,
            created_at: Utc::now(),
        });
    }

    Ok(created)
}

/// Best-effort deletion of removed images' backing files, after the owning
/// transaction has committed. An already-absent file is not an error; real
/// failures are logged and swallowed.
pub async fn sweep_removed(media: &dyn MediaStore, records: &[ImageRecord]) {
    for record in records {
        if let Err(e) = media.delete(&record.storage_path).await {
            tracing::warn!(
                image_id = %record.id,
                path = %record.storage_path,
                error = %e,
                "Failed to delete image file"
            );
        }
    }
}

/// Media-store key for a fresh upload: uuid plus an extension taken from the
/// submitted filename when it looks sane, otherwise guessed from the MIME
/// type.
fn storage_path_for(id: &str, upload: &NewUpload) -> String {
    let ext = upload
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&upload.mime_type)
                .and_then(|exts| exts.last())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    format!("galleries/{id}.{ext}")
}
