use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use stage_cms::storage::images::GalleryWrite;
use stage_cms::storage::models::{
    ImageRecord, Locale, NewsRecord, NewsTranslation, ShowingRecord, WorkRecord, WorkTranslation,
};
use stage_cms::storage::Database;

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_news(id: &str, slug: &str) -> NewsRecord {
    let now = Utc::now();
    let mut translations = BTreeMap::new();
    translations.insert(
        Locale::En,
        NewsTranslation {
            title: "Season opening".to_string(),
            body: "Doors at eight.".to_string(),
        },
    );
    translations.insert(
        Locale::Fr,
        NewsTranslation {
            title: "Ouverture de saison".to_string(),
            body: "Portes à vingt heures.".to_string(),
        },
    );
    NewsRecord {
        id: id.to_string(),
        slug: slug.to_string(),
        published: true,
        published_on: NaiveDate::from_ymd_opt(2024, 9, 15).unwrap(),
        translations,
        created_at: now,
        updated_at: now,
    }
}

fn sample_work(id: &str, slug: &str, year: Option<i32>) -> WorkRecord {
    let now = Utc::now();
    let mut translations = BTreeMap::new();
    translations.insert(
        Locale::En,
        WorkTranslation {
            title: "The Winter Piece".to_string(),
            summary: Some("A duet for empty stage.".to_string()),
            body: "Full programme notes.".to_string(),
        },
    );
    WorkRecord {
        id: id.to_string(),
        slug: slug.to_string(),
        year,
        translations,
        created_at: now,
        updated_at: now,
    }
}

fn sample_image(id: &str, owner: &str, position: u32) -> ImageRecord {
    ImageRecord {
        id: id.to_string(),
        owner_id: owner.to_string(),
        storage_path: format!("galleries/{id}.jpg"),
        mime_type: "image/jpeg".to_string(),
        byte_size: 2048,
        author: Some("House photographer".to_string()),
        thumbnail: position == 0,
        position,
        created_at: Utc::now(),
    }
}

fn showing(id: &str, work_id: &str, date: (i32, u32, u32), venue: &str) -> ShowingRecord {
    ShowingRecord {
        id: id.to_string(),
        work_id: work_id.to_string(),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        venue: venue.to_string(),
        city: None,
        note: None,
    }
}

// ============================================================================
// News
// ============================================================================

#[test]
fn test_save_and_get_news() {
    let (_dir, db) = test_db();
    let news = sample_news("n1", "season-opening");

    db.save_news(&news, &GalleryWrite::default()).unwrap();

    let retrieved = db.get_news("n1").unwrap().expect("news should exist");
    assert_eq!(retrieved.slug, "season-opening");
    assert!(retrieved.published);
    assert_eq!(retrieved.published_on, news.published_on);
    assert_eq!(retrieved.translations.len(), 2);
    assert_eq!(
        retrieved.translations.get(&Locale::Fr).unwrap().title,
        "Ouverture de saison"
    );
}

#[test]
fn test_get_news_by_slug() {
    let (_dir, db) = test_db();
    db.save_news(&sample_news("n2", "new-dates"), &GalleryWrite::default())
        .unwrap();

    let retrieved = db
        .get_news_by_slug("new-dates")
        .unwrap()
        .expect("news should exist");
    assert_eq!(retrieved.id, "n2");

    assert!(db.get_news_by_slug("no-such-slug").unwrap().is_none());
    assert!(db.get_news("nonexistent").unwrap().is_none());
}

#[test]
fn test_save_news_reindexes_changed_slug() {
    let (_dir, db) = test_db();
    let mut news = sample_news("n3", "old-slug");
    db.save_news(&news, &GalleryWrite::default()).unwrap();

    news.slug = "new-slug".to_string();
    db.save_news(&news, &GalleryWrite::default()).unwrap();

    assert!(db.get_news_by_slug("old-slug").unwrap().is_none());
    let retrieved = db
        .get_news_by_slug("new-slug")
        .unwrap()
        .expect("should resolve new slug");
    assert_eq!(retrieved.id, "n3");
    assert!(!db.news_slug_exists("old-slug").unwrap());
    assert!(db.news_slug_exists("new-slug").unwrap());
}

#[test]
fn test_list_news_filters_and_sorts() {
    let (_dir, db) = test_db();

    let mut old = sample_news("old", "old-item");
    old.published_on = NaiveDate::from_ymd_opt(2023, 1, 10).unwrap();
    let mut recent = sample_news("recent", "recent-item");
    recent.published_on = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
    let mut draft = sample_news("draft", "draft-item");
    draft.published = false;

    db.save_news(&old, &GalleryWrite::default()).unwrap();
    db.save_news(&recent, &GalleryWrite::default()).unwrap();
    db.save_news(&draft, &GalleryWrite::default()).unwrap();

    let public = db.list_news(true).unwrap();
    assert_eq!(public.len(), 2);
    assert_eq!(public[0].id, "recent");
    assert_eq!(public[1].id, "old");

    let all = db.list_news(false).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_save_news_with_gallery() {
    let (_dir, db) = test_db();
    let news = sample_news("n4", "with-images");

    let gallery = GalleryWrite {
        // Inserted out of display order on purpose
        upserts: vec![
            sample_image("img-b", "n4", 1),
            sample_image("img-a", "n4", 0),
        ],
        removals: vec![],
    };
    db.save_news(&news, &gallery).unwrap();

    let images = db.images_for_owner("n4").unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].id, "img-a");
    assert!(images[0].thumbnail);
    assert_eq!(images[1].id, "img-b");
    assert_eq!(images[1].position, 1);

    let single = db.get_image("img-a").unwrap().expect("image should exist");
    assert_eq!(single.owner_id, "n4");
    assert_eq!(single.author, Some("House photographer".to_string()));
}

#[test]
fn test_save_news_gallery_removals() {
    let (_dir, db) = test_db();
    let news = sample_news("n5", "shrinking");

    db.save_news(
        &news,
        &GalleryWrite {
            upserts: vec![
                sample_image("keep", "n5", 0),
                sample_image("drop", "n5", 1),
            ],
            removals: vec![],
        },
    )
    .unwrap();

    let mut kept = sample_image("keep", "n5", 0);
    kept.thumbnail = true;
    db.save_news(
        &news,
        &GalleryWrite {
            upserts: vec![kept],
            removals: vec!["drop".to_string()],
        },
    )
    .unwrap();

    let images = db.images_for_owner("n5").unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, "keep");
    assert!(db.get_image("drop").unwrap().is_none());
}

#[test]
fn test_delete_news_cascades_to_images() {
    let (_dir, db) = test_db();
    let news = sample_news("n6", "doomed");
    db.save_news(
        &news,
        &GalleryWrite {
            upserts: vec![
                sample_image("i1", "n6", 0),
                sample_image("i2", "n6", 1),
            ],
            removals: vec![],
        },
    )
    .unwrap();

    let removed = db.delete_news("n6").unwrap().expect("news should exist");
    let mut removed_ids: Vec<&str> = removed.iter().map(|r| r.id.as_str()).collect();
    removed_ids.sort();
    assert_eq!(removed_ids, vec!["i1", "i2"]);

    assert!(db.get_news("n6").unwrap().is_none());
    assert!(db.get_news_by_slug("doomed").unwrap().is_none());
    assert!(db.get_image("i1").unwrap().is_none());
    assert!(db.images_for_owner("n6").unwrap().is_empty());
}

#[test]
fn test_delete_news_not_found() {
    let (_dir, db) = test_db();
    assert!(db.delete_news("nonexistent").unwrap().is_none());
}

// ============================================================================
// Works and showings
// ============================================================================

#[test]
fn test_save_and_get_work() {
    let (_dir, db) = test_db();
    let work = sample_work("w1", "winter-piece", Some(2024));

    db.save_work(&work, &[], &GalleryWrite::default()).unwrap();

    let retrieved = db.get_work("w1").unwrap().expect("work should exist");
    assert_eq!(retrieved.slug, "winter-piece");
    assert_eq!(retrieved.year, Some(2024));

    let by_slug = db
        .get_work_by_slug("winter-piece")
        .unwrap()
        .expect("work should exist");
    assert_eq!(by_slug.id, "w1");
    assert!(db.work_slug_exists("winter-piece").unwrap());
    assert!(!db.work_slug_exists("unknown").unwrap());
}

#[test]
fn test_showings_sorted_by_date() {
    let (_dir, db) = test_db();
    let work = sample_work("w2", "touring", Some(2023));

    let showings = vec![
        showing("s2", "w2", (2024, 3, 10), "Théâtre de la Ville"),
        showing("s1", "w2", (2024, 1, 5), "Kampnagel"),
    ];
    db.save_work(&work, &showings, &GalleryWrite::default())
        .unwrap();

    let listed = db.showings_for_work("w2").unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, "s1");
    assert_eq!(listed[0].venue, "Kampnagel");
    assert_eq!(listed[1].id, "s2");
}

#[test]
fn test_save_work_replaces_showings_wholesale() {
    let (_dir, db) = test_db();
    let work = sample_work("w3", "revival", None);

    db.save_work(
        &work,
        &[showing("old-1", "w3", (2022, 6, 1), "Old venue")],
        &GalleryWrite::default(),
    )
    .unwrap();

    db.save_work(
        &work,
        &[
            showing("new-1", "w3", (2024, 2, 1), "New venue"),
            showing("new-2", "w3", (2024, 2, 2), "New venue"),
        ],
        &GalleryWrite::default(),
    )
    .unwrap();

    let listed = db.showings_for_work("w3").unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["new-1", "new-2"]);

    // Clearing them removes the index entry too
    db.save_work(&work, &[], &GalleryWrite::default()).unwrap();
    assert!(db.showings_for_work("w3").unwrap().is_empty());
}

#[test]
fn test_list_works_sorted_by_year() {
    let (_dir, db) = test_db();
    db.save_work(
        &sample_work("wa", "alpha", Some(2020)),
        &[],
        &GalleryWrite::default(),
    )
    .unwrap();
    db.save_work(
        &sample_work("wb", "beta", Some(2024)),
        &[],
        &GalleryWrite::default(),
    )
    .unwrap();
    db.save_work(&sample_work("wc", "gamma", None), &[], &GalleryWrite::default())
        .unwrap();

    let works = db.list_works().unwrap();
    let ids: Vec<&str> = works.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["wb", "wa", "wc"]);
}

#[test]
fn test_delete_work_cascades() {
    let (_dir, db) = test_db();
    let work = sample_work("w4", "ephemeral", Some(2021));
    db.save_work(
        &work,
        &[showing("s-only", "w4", (2021, 11, 20), "Studio")],
        &GalleryWrite {
            upserts: vec![sample_image("wimg", "w4", 0)],
            removals: vec![],
        },
    )
    .unwrap();

    let removed = db.delete_work("w4").unwrap().expect("work should exist");
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, "wimg");

    assert!(db.get_work("w4").unwrap().is_none());
    assert!(db.get_work_by_slug("ephemeral").unwrap().is_none());
    assert!(db.showings_for_work("w4").unwrap().is_empty());
    assert!(db.get_image("wimg").unwrap().is_none());

    assert!(db.delete_work("w4").unwrap().is_none());
}

// ============================================================================
// Locale resolution
// ============================================================================

#[test]
fn test_locale_resolution_with_fallback() {
    let news = sample_news("loc", "both-locales");
    let (served, t) = Locale::Fr.resolve(&news.translations).unwrap();
    assert_eq!(served, Locale::Fr);
    assert_eq!(t.title, "Ouverture de saison");

    let mut only_en = news.translations.clone();
    only_en.remove(&Locale::Fr);
    let (served, t) = Locale::Fr.resolve(&only_en).unwrap();
    assert_eq!(served, Locale::En);
    assert_eq!(t.title, "Season opening");

    let empty: BTreeMap<Locale, NewsTranslation> = BTreeMap::new();
    assert!(Locale::Fr.resolve(&empty).is_none());
}

// ============================================================================
// Purge
// ============================================================================

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    db.save_news(
        &sample_news("pn", "purge-news"),
        &GalleryWrite {
            upserts: vec![sample_image("pi", "pn", 0)],
            removals: vec![],
        },
    )
    .unwrap();
    db.save_work(
        &sample_work("pw", "purge-work", Some(2024)),
        &[showing("ps", "pw", (2024, 4, 4), "Somewhere")],
        &GalleryWrite::default(),
    )
    .unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.news, 1);
    assert_eq!(stats.works, 1);
    assert_eq!(stats.images, 1);
    assert_eq!(stats.showings, 1);

    assert!(db.list_news(false).unwrap().is_empty());
    assert!(db.list_works().unwrap().is_empty());
    assert!(!db.news_slug_exists("purge-news").unwrap());
    assert!(!db.work_slug_exists("purge-work").unwrap());
    assert!(db.images_for_owner("pn").unwrap().is_empty());
}
