//! stage-cms - content management API for a performing-arts collective
//!
//! This crate manages bilingual news and works (productions) with:
//! - Ordered image galleries reconciled against client-submitted final state
//! - Performance dates ("showings") attached to works
//! - Swappable media storage backends (local filesystem, GCS)
//! - redb embedded database for records (ACID, MVCC, crash-safe)
//! - Admin multipart API plus public JSON endpoints

pub mod api;
pub mod config;
pub mod gallery;
pub mod media;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub media: Arc<dyn media::MediaStore>,
}
