use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::images::{apply_gallery, remove_owner_images, GalleryWrite};
use super::models::{ImageRecord, ShowingRecord, WorkRecord};
use super::tables::*;

impl Database {
    // ========================================================================
    // Work operations
    // ========================================================================

    /// Create or update a work together with its showings and reconciled
    /// gallery. Showings are replaced wholesale; the work row, slug index,
    /// showing rows, and image writes/deletes commit as one transaction.
    pub fn save_work(
        &self,
        work: &WorkRecord,
        showings: &[ShowingRecord],
        gallery: &GalleryWrite,
    ) -> Result<(), DatabaseError> {
        debug_assert!(!work.id.is_empty(), "work id must not be empty");
        debug_assert!(!work.slug.is_empty(), "work slug must not be empty");
        debug_assert!(
            showings.iter().all(|s| s.work_id == work.id),
            "showing work_id must match the work being saved"
        );

        let write_txn = self.begin_write()?;
        {
            let previous_slug: Option<String> = {
                let table = write_txn.open_table(WORKS)?;
                let x = match table.get(work.id.as_str())? {
                    Some(data) => {
                        let existing: WorkRecord = rmp_serde::from_slice(data.value())?;
                        Some(existing.slug)
                    }
                    None => None,
                };
                x
            };

            {
                let mut table = write_txn.open_table(WORKS)?;
                let data = rmp_serde::to_vec_named(work)?;
                table.insert(work.id.as_str(), data.as_slice())?;
            }

            {
                let mut slug_table = write_txn.open_table(WORK_SLUGS)?;
                if let Some(old_slug) = previous_slug {
                    if old_slug != work.slug {
                        slug_table.remove(old_slug.as_str())?;
                    }
                }
                slug_table.insert(work.slug.as_str(), work.id.as_str())?;
            }

            replace_showings(&write_txn, &work.id, showings)?;
            apply_gallery(&write_txn, &work.id, gallery)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a work by its UUID
    pub fn get_work(&self, id: &str) -> Result<Option<WorkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WORKS)?;

        match table.get(id)? {
            Some(data) => {
                let work: WorkRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(work))
            }
            None => Ok(None),
        }
    }

    /// Get a work by its slug (resolves slug -> uuid -> row)
    pub fn get_work_by_slug(&self, slug: &str) -> Result<Option<WorkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let slug_table = read_txn.open_table(WORK_SLUGS)?;

        let id = match slug_table.get(slug)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let works_table = read_txn.open_table(WORKS)?;
        match works_table.get(id.as_str())? {
            Some(data) => {
                let work: WorkRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(work))
            }
            None => Ok(None),
        }
    }

    /// List works, most recent year first, then alphabetically by slug
    pub fn list_works(&self) -> Result<Vec<WorkRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WORKS)?;

        let mut works = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let work: WorkRecord = rmp_serde::from_slice(value.value())?;
            works.push(work);
        }
        works.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.slug.cmp(&b.slug)));

        Ok(works)
    }

    /// Check if a work slug is already in use
    pub fn work_slug_exists(&self, slug: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WORK_SLUGS)?;
        Ok(table.get(slug)?.is_some())
    }

    /// Get all showings of a work, earliest date first
    pub fn showings_for_work(&self, work_id: &str) -> Result<Vec<ShowingRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(WORK_SHOWINGS)?;
        let showings_table = read_txn.open_table(SHOWINGS)?;

        let showing_ids: Vec<String> = match index_table.get(work_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut showings = Vec::new();
        for showing_id in showing_ids {
            if let Some(data) = showings_table.get(showing_id.as_str())? {
                let showing: ShowingRecord = rmp_serde::from_slice(data.value())?;
                showings.push(showing);
            }
        }
        showings.sort_by(|a, b| a.date.cmp(&b.date));

        Ok(showings)
    }

    /// Delete a work and, in the same transaction, its showings and every
    /// image it owns. Returns the removed image records for the caller's
    /// file sweep, or `None` if the id was unknown.
    pub fn delete_work(&self, id: &str) -> Result<Option<Vec<ImageRecord>>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let slug: Option<String> = {
            let table = write_txn.open_table(WORKS)?;
            let x = match table.get(id)? {
                Some(data) => {
                    let work: WorkRecord = rmp_serde::from_slice(data.value())?;
                    Some(work.slug)
                }
                None => None,
            };
            x
        };

        let removed = match slug {
            Some(slug) => {
                {
                    let mut table = write_txn.open_table(WORKS)?;
                    table.remove(id)?;
                }
                {
                    let mut slug_table = write_txn.open_table(WORK_SLUGS)?;
                    slug_table.remove(slug.as_str())?;
                }
                replace_showings(&write_txn, id, &[])?;
                Some(remove_owner_images(&write_txn, id)?)
            }
            None => None,
        };

        write_txn.commit()?;
        Ok(removed)
    }
}

/// Replace a work's showings wholesale: drop the previous rows, insert the
/// new ones, rewrite the per-work index (removed entirely when empty).
fn replace_showings(
    txn: &WriteTransaction,
    work_id: &str,
    showings: &[ShowingRecord],
) -> Result<(), DatabaseError> {
    let previous_ids: Vec<String> = {
        let index_table = txn.open_table(WORK_SHOWINGS)?;
        let x = match index_table.get(work_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => Vec::new(),
        };
        x
    };

    {
        let mut showings_table = txn.open_table(SHOWINGS)?;
        for id in &previous_ids {
            showings_table.remove(id.as_str())?;
        }
        for showing in showings {
            let data = rmp_serde::to_vec_named(showing)?;
            showings_table.insert(showing.id.as_str(), data.as_slice())?;
        }
    }

    let mut index_table = txn.open_table(WORK_SHOWINGS)?;
    if showings.is_empty() {
        index_table.remove(work_id)?;
    } else {
        let ids: Vec<&str> = showings.iter().map(|s| s.id.as_str()).collect();
        let data = rmp_serde::to_vec_named(&ids)?;
        index_table.insert(work_id, data.as_slice())?;
    }

    Ok(())
}
