use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use stage_cms::gallery::{self, DesiredImage, GalleryError, NewUpload};
use stage_cms::media::{LocalStore, MediaStore, MediaStoreError};
use stage_cms::storage::models::{ImageRecord, Locale, NewsRecord, NewsTranslation};
use stage_cms::storage::Database;

// ============================================================================
// Helpers
// ============================================================================

fn img(id: &str, owner: &str, position: u32, thumbnail: bool) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        owner_id: owner.to_string(),
        storage_path: format!("galleries/{id}.jpg"),
        mime_type: "image/jpeg".to_string(),
        byte_size: 1024,
        author: None,
        thumbnail,
        position,
        created_at: Utc::now(),
    }
}

fn keep(id: &str, thumbnail: bool) -> DesiredImage {
    DesiredImage::Existing {
        id: id.to_string(),
        author: None,
        thumbnail,
    }
}

fn fresh(thumbnail: bool) -> DesiredImage {
    DesiredImage::New {
        author: None,
        thumbnail,
    }
}

fn upload(file_name: &str, content: &str) -> NewUpload {
    NewUpload {
        bytes: Bytes::from(content.to_string()),
        mime_type: "image/jpeg".to_string(),
        file_name: Some(file_name.to_string()),
    }
}

fn sample_news(id: &str, slug: &str) -> NewsRecord {
    let now = Utc::now();
    let mut translations = BTreeMap::new();
    translations.insert(
        Locale::En,
        NewsTranslation {
            title: "Premiere announced".to_string(),
            body: "Details to follow.".to_string(),
        },
    );
    NewsRecord {
        id: id.to_string(),
        slug: slug.to_string(),
        published: true,
        published_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        translations,
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// plan: pure diffing
// ============================================================================

#[test]
fn test_permutation_reorders_without_churn() {
    let existing = vec![
        img("a", "owner", 0, true),
        img("b", "owner", 1, false),
        img("c", "owner", 2, false),
    ];
    let desired = vec![keep("c", true), keep("a", false), keep("b", false)];

    let plan = gallery::plan(&existing, &desired, 0).unwrap();

    assert!(plan.creates.is_empty());
    assert!(plan.deletes.is_empty());
    assert!(plan.skipped.is_empty());
    assert_eq!(plan.updates.len(), 3);
    assert_eq!(plan.updates[0].id, "c");
    assert_eq!(plan.updates[0].position, 0);
    assert_eq!(plan.updates[1].id, "a");
    assert_eq!(plan.updates[1].position, 1);
    assert_eq!(plan.updates[2].id, "b");
    assert_eq!(plan.updates[2].position, 2);
}

#[test]
fn test_omitted_records_are_deleted() {
    let existing = vec![
        img("a", "owner", 0, false),
        img("b", "owner", 1, false),
        img("c", "owner", 2, false),
    ];
    let desired = vec![keep("b", false)];

    let plan = gallery::plan(&existing, &desired, 0).unwrap();

    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].id, "b");
    assert_eq!(plan.updates[0].position, 0);

    let mut deleted: Vec<&str> = plan.deletes.iter().map(|r| r.id.as_str()).collect();
    deleted.sort();
    assert_eq!(deleted, vec!["a", "c"]);
}

#[test]
fn test_empty_sequence_deletes_everything() {
    let existing = vec![img("5", "owner", 0, true)];
    let plan = gallery::plan(&existing, &[], 0).unwrap();

    assert!(plan.updates.is_empty());
    assert!(plan.creates.is_empty());
    assert_eq!(plan.deletes.len(), 1);
    assert_eq!(plan.deletes[0].id, "5");
    assert_eq!(plan.deletes[0].storage_path, "galleries/5.jpg");
}

#[test]
fn test_new_entries_take_sequence_positions() {
    let desired = vec![fresh(true), fresh(false), fresh(false)];
    let plan = gallery::plan(&[], &desired, 3).unwrap();

    assert!(plan.updates.is_empty());
    assert!(plan.deletes.is_empty());
    assert_eq!(plan.creates.len(), 3);
    for (i, slot) in plan.creates.iter().enumerate() {
        assert_eq!(slot.position, i as u32);
        assert_eq!(slot.payload_index, i);
    }
    assert!(plan.creates[0].thumbnail);
    assert!(!plan.creates[1].thumbnail);
}

#[test]
fn test_payload_counter_is_independent_of_position() {
    let existing = vec![img("a", "owner", 0, false), img("b", "owner", 1, false)];
    let desired = vec![keep("a", false), fresh(false), keep("b", false), fresh(false)];

    let plan = gallery::plan(&existing, &desired, 2).unwrap();

    assert_eq!(plan.creates.len(), 2);
    assert_eq!(plan.creates[0].position, 1);
    assert_eq!(plan.creates[0].payload_index, 0);
    assert_eq!(plan.creates[1].position, 3);
    assert_eq!(plan.creates[1].payload_index, 1);
}

#[test]
fn test_payload_count_mismatch_fails() {
    let desired = vec![fresh(false), fresh(false)];

    let too_few = gallery::plan(&[], &desired, 1).unwrap_err();
    assert!(matches!(
        too_few,
        GalleryError::PayloadCountMismatch {
            declared: 2,
            supplied: 1
        }
    ));

    let too_many = gallery::plan(&[], &desired, 3).unwrap_err();
    assert!(matches!(
        too_many,
        GalleryError::PayloadCountMismatch {
            declared: 2,
            supplied: 3
        }
    ));
    assert!(too_many.to_string().contains("declares 2 new image(s)"));
}

#[test]
fn test_stale_reference_is_skipped() {
    let existing = vec![img("a", "owner", 0, false)];
    let desired = vec![keep("ghost", true), keep("a", false)];

    let plan = gallery::plan(&existing, &desired, 0).unwrap();

    assert_eq!(plan.skipped, vec!["ghost".to_string()]);
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].id, "a");
    // No gap-filling: the surviving image keeps its submitted slot
    assert_eq!(plan.updates[0].position, 1);
    assert!(plan.deletes.is_empty());
}

#[test]
fn test_mixed_scenario() {
    // Existing: id 1 first and thumbnail, id 2 second.
    // Submit: 2 first (now thumbnail), 1 second, one new file last.
    let existing = vec![img("1", "owner", 0, true), img("2", "owner", 1, false)];
    let desired = vec![keep("2", true), keep("1", false), fresh(false)];

    let plan = gallery::plan(&existing, &desired, 1).unwrap();

    assert_eq!(plan.updates.len(), 2);
    assert_eq!(plan.updates[0].id, "2");
    assert_eq!(plan.updates[0].position, 0);
    assert!(plan.updates[0].thumbnail);
    assert_eq!(plan.updates[1].id, "1");
    assert_eq!(plan.updates[1].position, 1);
    assert!(!plan.updates[1].thumbnail);

    assert_eq!(plan.creates.len(), 1);
    assert_eq!(plan.creates[0].position, 2);
    assert_eq!(plan.creates[0].payload_index, 0);

    assert!(plan.deletes.is_empty());
}

#[test]
fn test_thumbnail_flags_taken_verbatim() {
    // Malformed input with two thumbnails is passed through, not corrected
    let existing = vec![img("a", "owner", 0, false), img("b", "owner", 1, false)];
    let desired = vec![keep("a", true), keep("b", true)];

    let plan = gallery::plan(&existing, &desired, 0).unwrap();
    assert!(plan.updates.iter().all(|r| r.thumbnail));
}

#[test]
fn test_author_updates_applied() {
    let existing = vec![img("a", "owner", 0, false)];
    let desired = vec![DesiredImage::Existing {
        id: "a".to_string(),
        author: Some("J. Doe".to_string()),
        thumbnail: false,
    }];

    let plan = gallery::plan(&existing, &desired, 0).unwrap();
    assert_eq!(plan.updates[0].author, Some("J. Doe".to_string()));
}

#[test]
fn test_write_set_combines_updates_and_creates() {
    let existing = vec![img("a", "owner", 0, false), img("b", "owner", 1, false)];
    let desired = vec![keep("b", false), fresh(false)];

    let plan = gallery::plan(&existing, &desired, 1).unwrap();
    let created = vec![img("fresh-id", "owner", 1, false)];
    let write = plan.write_set(created);

    let ids: Vec<&str> = write.upserts.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "fresh-id"]);
    assert_eq!(write.removals, vec!["a".to_string()]);
}

// ============================================================================
// stage_uploads: media writes
// ============================================================================

#[tokio::test]
async fn test_stage_uploads_writes_files_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let desired = vec![fresh(true), fresh(false)];
    let plan = gallery::plan(&[], &desired, 2).unwrap();
    let uploads = vec![upload("first.jpg", "first bytes"), upload("second.png", "second!")];

    let created = gallery::stage_uploads(&store, "owner-1", &plan, &uploads)
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0].position, 0);
    assert!(created[0].thumbnail);
    assert_eq!(created[0].owner_id, "owner-1");
    assert_eq!(created[0].byte_size, "first bytes".len() as u64);
    assert!(created[0].storage_path.ends_with(".jpg"));
    assert_eq!(created[1].position, 1);
    assert!(created[1].storage_path.ends_with(".png"));

    // Each record's path holds the bytes of its corresponding payload
    let stored = store.get(&created[0].storage_path).await.unwrap();
    assert_eq!(stored, Bytes::from("first bytes"));
    let stored = store.get(&created[1].storage_path).await.unwrap();
    assert_eq!(stored, Bytes::from("second!"));
}

/// Delegates to a LocalStore but fails every put after the first
struct FlakyStore {
    inner: LocalStore,
    puts: AtomicUsize,
}

#[async_trait]
impl MediaStore for FlakyStore {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<(), MediaStoreError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) >= 1 {
            return Err(MediaStoreError::Backend("disk full".to_string()));
        }
        self.inner.put(key, content_type, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, MediaStoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, MediaStoreError> {
        self.inner.exists(key).await
    }
}

#[tokio::test]
async fn test_stage_uploads_failure_unwinds_earlier_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore {
        inner: LocalStore::new(dir.path()).unwrap(),
        puts: AtomicUsize::new(0),
    };

    let desired = vec![fresh(false), fresh(false)];
    let plan = gallery::plan(&[], &desired, 2).unwrap();
    let uploads = vec![upload("a.jpg", "aaaa"), upload("b.jpg", "bbbb")];

    let err = gallery::stage_uploads(&store, "owner-1", &plan, &uploads)
        .await
        .unwrap_err();
    assert!(matches!(err, GalleryError::Upload(_)));

    // The blob stored before the failure was cleaned up again
    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("galleries"))
        .map(|entries| entries.collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}

// ============================================================================
// Full reconcile flow against the database
// ============================================================================

fn test_db(dir: &tempfile::TempDir) -> Database {
    Database::open(dir.path().join("data")).unwrap()
}

async fn save_with_gallery(
    db: &Database,
    store: &dyn MediaStore,
    news: &NewsRecord,
    desired: &[DesiredImage],
    uploads: &[NewUpload],
) -> Vec<ImageRecord> {
    let persisted = db.images_for_owner(&news.id).unwrap();
    let plan = gallery::plan(&persisted, desired, uploads.len()).unwrap();
    let created = gallery::stage_uploads(store, &news.id, &plan, uploads)
        .await
        .unwrap();
    db.save_news(news, &plan.write_set(created)).unwrap();
    gallery::sweep_removed(store, &plan.deletes).await;
    db.images_for_owner(&news.id).unwrap()
}

#[tokio::test]
async fn test_full_reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(&dir);
    let store = LocalStore::new(dir.path().join("media")).unwrap();
    let news = sample_news("n1", "premiere");

    let desired = vec![fresh(true), fresh(false)];
    let uploads = vec![upload("a.jpg", "aaaa"), upload("b.jpg", "bbbb")];
    let first = save_with_gallery(&db, &store, &news, &desired, &uploads).await;
    assert_eq!(first.len(), 2);

    // Resubmit the exact gallery the first call produced
    let resubmit: Vec<DesiredImage> = first
        .iter()
        .map(|r| DesiredImage::Existing {
            id: r.id.clone(),
            author: r.author.clone(),
            thumbnail: r.thumbnail,
        })
        .collect();
    let second = save_with_gallery(&db, &store, &news, &resubmit, &[]).await;

    assert_eq!(first.len(), second.len());
    for (before, after) in first.iter().zip(second.iter()) {
        assert_eq!(before.id, after.id);
        assert_eq!(before.position, after.position);
        assert_eq!(before.thumbnail, after.thumbnail);
        assert_eq!(before.author, after.author);
        assert_eq!(before.storage_path, after.storage_path);
    }
}

#[tokio::test]
async fn test_full_edit_deletes_orphans_and_their_files() {
    let dir = tempfile::tempdir().unwrap();
    let db = test_db(&dir);
    let store = LocalStore::new(dir.path().join("media")).unwrap();
    let news = sample_news("n2", "on-tour");

    let desired = vec![fresh(true), fresh(false)];
    let uploads = vec![upload("a.jpg", "aaaa"), upload("b.jpg", "bbbb")];
    let first = save_with_gallery(&db, &store, &news, &desired, &uploads).await;

    // Keep only the second image, promoted to thumbnail
    let resubmit = vec![DesiredImage::Existing {
        id: first[1].id.clone(),
        author: None,
        thumbnail: true,
    }];
    let second = save_with_gallery(&db, &store, &news, &resubmit, &[]).await;

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[1].id);
    assert_eq!(second[0].position, 0);
    assert!(second[0].thumbnail);

    assert!(db.get_image(&first[0].id).unwrap().is_none());
    assert!(!store.exists(&first[0].storage_path).await.unwrap());
    assert!(store.exists(&first[1].storage_path).await.unwrap());
}
