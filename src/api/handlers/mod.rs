mod admin;
mod media;
mod news;
mod works;

pub use admin::{admin_purge, health};
pub use media::serve_media;
pub use news::{
    create_news, delete_news, get_news, get_published_news, list_news, list_published_news,
    update_news,
};
pub use works::{
    create_work, delete_work, get_public_work, get_work, list_public_works, list_works,
    update_work,
};

use axum::extract::multipart::Field;
use serde::Serialize;

use crate::api::response::ApiError;
use crate::gallery::{DesiredImage, GalleryError, NewUpload};
use crate::storage::models::ImageRecord;

/// Map a GalleryError to an ApiError
fn gallery_error(e: GalleryError) -> ApiError {
    match e {
        GalleryError::PayloadCountMismatch { .. } => ApiError::bad_request(e.to_string()),
        GalleryError::Upload(_) => ApiError::internal(e.to_string()),
    }
}

/// A gallery image as returned by both the admin and public endpoints
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: String,
    pub url: String,
    pub author: Option<String>,
    pub thumbnail: bool,
    pub position: u32,
    pub mime_type: String,
}

fn image_to_response(image: &ImageRecord) -> ImageResponse {
    ImageResponse {
        id: image.id.clone(),
        url: format!("/media/{}", image.id),
        author: image.author.clone(),
        thumbnail: image.thumbnail,
        position: image.position,
        mime_type: image.mime_type.clone(),
    }
}

fn images_to_responses(images: &[ImageRecord]) -> Vec<ImageResponse> {
    images.iter().map(image_to_response).collect()
}

// ============================================================================
// Shared multipart helpers
// ============================================================================

async fn read_text_field(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid {name}: {e}")))
}

/// Read one `new_images` file part, enforcing the per-file size cap and
/// settling its MIME type (part header, filename guess, octet-stream).
async fn read_upload_field(field: Field<'_>, max_upload_size: u64) -> Result<NewUpload, ApiError> {
    let file_name = field.file_name().map(|s| s.to_string());
    let content_type = field.content_type().map(|s| s.to_string());

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read image upload: {e}")))?;

    if data.len() as u64 > max_upload_size {
        return Err(ApiError::payload_too_large(format!(
            "Image exceeds maximum upload size of {max_upload_size} bytes"
        )));
    }

    let mime_type = content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            file_name
                .as_deref()
                .and_then(|n| mime_guess::from_path(n).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(NewUpload {
        bytes: data,
        mime_type,
        file_name,
    })
}

/// Parse the `ordered_images` JSON array into the desired gallery sequence
fn parse_desired_images(text: &str) -> Result<Vec<DesiredImage>, ApiError> {
    serde_json::from_str(text).map_err(|e| {
        ApiError::bad_request(format!(
            "ordered_images must be a JSON array of image descriptors: {e}"
        ))
    })
}

/// Warn about submitted existing-image ids that matched nothing. The edit
/// proceeds without them; this usually means the dashboard was stale.
fn log_skipped(owner_id: &str, skipped: &[String]) {
    for id in skipped {
        tracing::warn!(owner_id = %owner_id, image_id = %id, "Ignoring reference to unknown image");
    }
}
