use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::images::{apply_gallery, remove_owner_images, GalleryWrite};
use super::models::{ImageRecord, NewsRecord};
use super::tables::*;

impl Database {
    // ========================================================================
    // News operations
    // ========================================================================

    /// Create or update a news item together with its reconciled gallery.
    /// The row, the slug index, and every image write/delete commit as one
    /// transaction; on failure nothing is applied.
    pub fn save_news(
        &self,
        news: &NewsRecord,
        gallery: &GalleryWrite,
    ) -> Result<(), DatabaseError> {
        debug_assert!(!news.id.is_empty(), "news id must not be empty");
        debug_assert!(!news.slug.is_empty(), "news slug must not be empty");

        let write_txn = self.begin_write()?;
        {
            let previous_slug: Option<String> = {
                let table = write_txn.open_table(NEWS)?;
                let x = match table.get(news.id.as_str())? {
                    Some(data) => {
                        let existing: NewsRecord = rmp_serde::from_slice(data.value())?;
                        Some(existing.slug)
                    }
                    None => None,
                };
                x
            };

            {
                let mut table = write_txn.open_table(NEWS)?;
                let data = rmp_serde::to_vec_named(news)?;
                table.insert(news.id.as_str(), data.as_slice())?;
            }

            {
                let mut slug_table = write_txn.open_table(NEWS_SLUGS)?;
                if let Some(old_slug) = previous_slug {
                    if old_slug != news.slug {
                        slug_table.remove(old_slug.as_str())?;
                    }
                }
                slug_table.insert(news.slug.as_str(), news.id.as_str())?;
            }

            apply_gallery(&write_txn, &news.id, gallery)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a news item by its UUID
    pub fn get_news(&self, id: &str) -> Result<Option<NewsRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NEWS)?;

        match table.get(id)? {
            Some(data) => {
                let news: NewsRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(news))
            }
            None => Ok(None),
        }
    }

    /// Get a news item by its slug (resolves slug -> uuid -> row)
    pub fn get_news_by_slug(&self, slug: &str) -> Result<Option<NewsRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let slug_table = read_txn.open_table(NEWS_SLUGS)?;

        let id = match slug_table.get(slug)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let news_table = read_txn.open_table(NEWS)?;
        match news_table.get(id.as_str())? {
            Some(data) => {
                let news: NewsRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(news))
            }
            None => Ok(None),
        }
    }

    /// List news items, newest publication date first. `published_only`
    /// filters drafts out for the public site.
    pub fn list_news(&self, published_only: bool) -> Result<Vec<NewsRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NEWS)?;

        let mut items = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let news: NewsRecord = rmp_serde::from_slice(value.value())?;
            if !published_only || news.published {
                items.push(news);
            }
        }
        items.sort_by(|a, b| b.published_on.cmp(&a.published_on));

        Ok(items)
    }

    /// Check if a news slug is already in use
    pub fn news_slug_exists(&self, slug: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NEWS_SLUGS)?;
        Ok(table.get(slug)?.is_some())
    }

    /// Delete a news item and, in the same transaction, every image it owns.
    /// Returns the removed image records for the caller's file sweep, or
    /// `None` if the id was unknown.
    pub fn delete_news(&self, id: &str) -> Result<Option<Vec<ImageRecord>>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let slug: Option<String> = {
            let table = write_txn.open_table(NEWS)?;
            let x = match table.get(id)? {
                Some(data) => {
                    let news: NewsRecord = rmp_serde::from_slice(data.value())?;
                    Some(news.slug)
                }
                None => None,
            };
            x
        };

        let removed = match slug {
            Some(slug) => {
                {
                    let mut table = write_txn.open_table(NEWS)?;
                    table.remove(id)?;
                }
                {
                    let mut slug_table = write_txn.open_table(NEWS_SLUGS)?;
                    slug_table.remove(slug.as_str())?;
                }
                Some(remove_owner_images(&write_txn, id)?)
            }
            None => None,
        };

        write_txn.commit()?;
        Ok(removed)
    }
}
