use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::AppState;

/// Serve a gallery image's bytes by image id.
/// Route: GET /media/:id
pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<Response, ApiError> {
    let image = state
        .db
        .get_image(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    let data = state
        .media
        .get(&image.storage_path)
        .await
        .map_err(|e| match e {
            crate::media::MediaStoreError::NotFound(_) => {
                ApiError::not_found("Image content not found")
            }
            _ => ApiError::internal(format!("Failed to retrieve image: {e}")),
        })?;

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        image
            .mime_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(image.byte_size),
    );

    // Set Content-Disposition with the filename from the storage path's last segment
    let filename = image
        .storage_path
        .rsplit('/')
        .next()
        .unwrap_or(&image.storage_path);
    if let Ok(value) = format!("inline; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Blobs are immutable once stored (edits swap in new ids), so cache hard
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=86400, immutable"),
    );

    Ok(response)
}
