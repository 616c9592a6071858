use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::ImageRecord;
use super::tables::*;

/// The persistence half of a reconciled gallery: records to write back
/// (kept + newly created, already carrying their final positions) and ids to
/// remove. Applied inside the owning entity's write transaction.
#[derive(Debug, Default)]
pub struct GalleryWrite {
    pub upserts: Vec<ImageRecord>,
    pub removals: Vec<String>,
}

impl Database {
    // ========================================================================
    // Image queries
    // ========================================================================

    /// Get a gallery image by its UUID
    pub fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IMAGES)?;

        match table.get(id)? {
            Some(data) => {
                let image: ImageRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(image))
            }
            None => Ok(None),
        }
    }

    /// Get all images owned by a news item or work, in display order
    pub fn images_for_owner(&self, owner_id: &str) -> Result<Vec<ImageRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_IMAGES)?;
        let images_table = read_txn.open_table(IMAGES)?;

        let image_ids: Vec<String> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut images = Vec::new();
        for image_id in image_ids {
            if let Some(data) = images_table.get(image_id.as_str())? {
                let image: ImageRecord = rmp_serde::from_slice(data.value())?;
                images.push(image);
            }
        }
        images.sort_by_key(|img| img.position);

        Ok(images)
    }
}

// ============================================================================
// In-transaction helpers (shared by the news and work save/delete paths)
// ============================================================================

/// Apply a reconciled gallery for one owner: upsert the surviving records,
/// remove the orphaned ones, and rewrite the owner index in display order.
pub(super) fn apply_gallery(
    txn: &WriteTransaction,
    owner_id: &str,
    gallery: &GalleryWrite,
) -> Result<(), DatabaseError> {
    {
        let mut images_table = txn.open_table(IMAGES)?;
        for record in &gallery.upserts {
            let data = rmp_serde::to_vec_named(record)?;
            images_table.insert(record.id.as_str(), data.as_slice())?;
        }
        for id in &gallery.removals {
            images_table.remove(id.as_str())?;
        }
    }

    let mut ordered: Vec<&ImageRecord> = gallery.upserts.iter().collect();
    ordered.sort_by_key(|img| img.position);
    let ids: Vec<&str> = ordered.iter().map(|img| img.id.as_str()).collect();

    let mut owner_table = txn.open_table(OWNER_IMAGES)?;
    if ids.is_empty() {
        owner_table.remove(owner_id)?;
    } else {
        let data = rmp_serde::to_vec_named(&ids)?;
        owner_table.insert(owner_id, data.as_slice())?;
    }

    Ok(())
}

/// Remove every image owned by an entity (cascade path). Returns the removed
/// records so the caller can sweep their backing files after commit.
pub(super) fn remove_owner_images(
    txn: &WriteTransaction,
    owner_id: &str,
) -> Result<Vec<ImageRecord>, DatabaseError> {
    let image_ids: Vec<String> = {
        let owner_table = txn.open_table(OWNER_IMAGES)?;
        let x = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => Vec::new(),
        };
        x
    };

    let mut removed = Vec::new();
    {
        let mut images_table = txn.open_table(IMAGES)?;
        for id in &image_ids {
            if let Some(data) = images_table.get(id.as_str())? {
                let image: ImageRecord = rmp_serde::from_slice(data.value())?;
                removed.push(image);
            }
            images_table.remove(id.as_str())?;
        }
    }

    let mut owner_table = txn.open_table(OWNER_IMAGES)?;
    owner_table.remove(owner_id)?;

    Ok(removed)
}
