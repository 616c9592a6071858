use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // A gallery submission carries several files plus the entity fields; the
    // per-file cap is enforced in the handlers.
    let body_limit = (state.config.max_upload_size as usize).saturating_mul(8);

    let mut router = Router::new()
        // Public site
        .route("/news", get(handlers::list_published_news))
        .route("/news/:slug", get(handlers::get_published_news))
        .route("/works", get(handlers::list_public_works))
        .route("/works/:slug", get(handlers::get_public_work))
        .route("/media/:id", get(handlers::serve_media))
        // Admin: news
        .route("/admin/news", get(handlers::list_news))
        .route(
            "/admin/news",
            post(handlers::create_news).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/news/:id", get(handlers::get_news))
        .route(
            "/admin/news/:id",
            put(handlers::update_news).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/news/:id", delete(handlers::delete_news))
        // Admin: works
        .route("/admin/works", get(handlers::list_works))
        .route(
            "/admin/works",
            post(handlers::create_work).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/works/:id", get(handlers::get_work))
        .route(
            "/admin/works/:id",
            put(handlers::update_work).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/admin/works/:id", delete(handlers::delete_work))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled — purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;

    #[test]
    fn router_builds_with_test_routes() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        assert!(state.config.test_mode);
        let _router = create_router(state);
    }
}
