use redb::TableDefinition;

/// News rows: uuid -> NewsRecord (msgpack)
pub const NEWS: TableDefinition<&str, &[u8]> = TableDefinition::new("news");

/// News slug index: slug -> uuid (for public page lookups)
pub const NEWS_SLUGS: TableDefinition<&str, &str> = TableDefinition::new("news_slugs");

/// Work rows: uuid -> WorkRecord (msgpack)
pub const WORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("works");

/// Work slug index: slug -> uuid
pub const WORK_SLUGS: TableDefinition<&str, &str> = TableDefinition::new("work_slugs");

/// Gallery images: uuid -> ImageRecord (msgpack)
pub const IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("images");

/// Owner index: news/work uuid -> msgpack Vec of image UUIDs in display order
pub const OWNER_IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_images");

/// Showings: uuid -> ShowingRecord (msgpack)
pub const SHOWINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("showings");

/// Work index: work uuid -> msgpack Vec of showing UUIDs
pub const WORK_SHOWINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("work_showings");
