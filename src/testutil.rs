//! Shared test helpers for stage-cms unit tests.

use std::sync::Arc;

use crate::config::{Config, MediaConfig, ServerConfig};
use crate::media::LocalStore;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database and local media store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let media_dir = temp_dir.path().join("media");

    let config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        media: MediaConfig {
            local_path: media_dir.to_string_lossy().to_string(),
            ..MediaConfig::default()
        },
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let media = LocalStore::new(&media_dir).expect("Failed to create test media store");

    Arc::new(AppState {
        config,
        db,
        media: Arc::new(media),
    })
}
