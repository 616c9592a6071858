use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    gallery_error, images_to_responses, log_skipped, parse_desired_images, read_text_field,
    read_upload_field, ImageResponse,
};
use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::gallery::{self, DesiredImage, NewUpload};
use crate::storage::models::{ImageRecord, Locale, NewsRecord, NewsTranslation};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct NewsResponse {
    pub id: String,
    pub slug: String,
    pub published: bool,
    pub published_on: String,
    pub translations: BTreeMap<Locale, NewsTranslation>,
    pub images: Vec<ImageResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PublicNewsResponse {
    pub slug: String,
    /// The locale actually served (after fallback)
    pub locale: Locale,
    pub title: String,
    pub body: String,
    pub published_on: String,
    pub images: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct PublicListParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_locale")]
    pub locale: Locale,
}

#[derive(Debug, Deserialize)]
pub struct PublicGetParams {
    #[serde(default = "default_locale")]
    pub locale: Locale,
}

fn default_limit() -> u32 {
    20
}

fn default_locale() -> Locale {
    Locale::En
}

/// Everything pulled out of a news create/update multipart form. The
/// dashboard always posts the full form, so create and update share the
/// same required fields.
#[derive(Default)]
struct NewsSubmission {
    slug: Option<String>,
    published: bool,
    published_on: Option<NaiveDate>,
    translations: Option<BTreeMap<Locale, NewsTranslation>>,
    desired: Vec<DesiredImage>,
    uploads: Vec<NewUpload>,
}

struct ValidNews {
    slug: String,
    published: bool,
    published_on: NaiveDate,
    translations: BTreeMap<Locale, NewsTranslation>,
}

async fn collect_submission(
    multipart: &mut Multipart,
    max_upload_size: u64,
) -> Result<NewsSubmission, ApiError> {
    let mut sub = NewsSubmission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "slug" => {
                sub.slug = Some(read_text_field(field, "slug").await?);
            }
            "published" => {
                let text = read_text_field(field, "published").await?;
                sub.published = text == "true" || text == "1";
            }
            "published_on" => {
                let text = read_text_field(field, "published_on").await?;
                let date = text.parse::<NaiveDate>().map_err(|e| {
                    ApiError::bad_request(format!(
                        "Invalid published_on (expected YYYY-MM-DD): {e}"
                    ))
                })?;
                sub.published_on = Some(date);
            }
            "translations" => {
                let text = read_text_field(field, "translations").await?;
                let parsed: BTreeMap<Locale, NewsTranslation> = serde_json::from_str(&text)
                    .map_err(|e| {
                        ApiError::bad_request(format!(
                            "translations must be a JSON object keyed by locale: {e}"
                        ))
                    })?;
                sub.translations = Some(parsed);
            }
            "ordered_images" => {
                let text = read_text_field(field, "ordered_images").await?;
                sub.desired = parse_desired_images(&text)?;
            }
            "new_images" => {
                sub.uploads
                    .push(read_upload_field(field, max_upload_size).await?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Ok(sub)
}

fn validate(sub: &NewsSubmission) -> Result<ValidNews, ApiError> {
    let slug = sub
        .slug
        .clone()
        .ok_or_else(|| ApiError::bad_request("slug field is required"))?;
    if slug.trim().is_empty() {
        return Err(ApiError::bad_request("slug must not be empty"));
    }

    let published_on = sub
        .published_on
        .ok_or_else(|| ApiError::bad_request("published_on field is required"))?;

    let translations = sub
        .translations
        .clone()
        .ok_or_else(|| ApiError::bad_request("translations field is required"))?;
    if translations.is_empty() {
        return Err(ApiError::bad_request("at least one translation is required"));
    }
    for (locale, translation) in &translations {
        if translation.title.trim().is_empty() {
            return Err(ApiError::bad_request(format!(
                "{locale} title must not be empty"
            )));
        }
    }

    Ok(ValidNews {
        slug,
        published: sub.published,
        published_on,
        translations,
    })
}

// ============================================================================
// Admin handlers
// ============================================================================

pub async fn create_news(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<NewsResponse>>, ApiError> {
    let sub = collect_submission(&mut multipart, state.config.max_upload_size).await?;
    let fields = validate(&sub)?;

    if state
        .db
        .news_slug_exists(&fields.slug)
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Err(ApiError::conflict(format!(
            "slug '{}' is already in use",
            fields.slug
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();

    // A fresh entity owns no images yet; existing references are skipped
    // exactly like stale ids on edit.
    let plan = gallery::plan(&[], &sub.desired, sub.uploads.len()).map_err(gallery_error)?;
    log_skipped(&id, &plan.skipped);

    // Phase 1: store the uploaded files
    let created = gallery::stage_uploads(state.media.as_ref(), &id, &plan, &sub.uploads)
        .await
        .map_err(gallery_error)?;

    let now = Utc::now();
    let record = NewsRecord {
        id: id.clone(),
        slug: fields.slug.clone(),
        published: fields.published,
        published_on: fields.published_on,
        translations: fields.translations,
        created_at: now,
        updated_at: now,
    };

    // Phase 2: commit the row and gallery as one transaction
    let write = plan.write_set(created.clone());
    if let Err(e) = state.db.save_news(&record, &write) {
        // Best-effort cleanup of the blobs staged for this save
        gallery::sweep_removed(state.media.as_ref(), &created).await;
        return Err(ApiError::internal(e.to_string()));
    }

    let images = owned_images(&state, &id)?;
    tracing::debug!(news_id = %id, slug = %record.slug, "Created news item");
    Ok(JSend::success(news_to_response(&record, &images)))
}

pub async fn update_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<JSend<NewsResponse>>, ApiError> {
    let existing = state
        .db
        .get_news(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("News item not found"))?;

    let sub = collect_submission(&mut multipart, state.config.max_upload_size).await?;
    let fields = validate(&sub)?;

    if fields.slug != existing.slug
        && state
            .db
            .news_slug_exists(&fields.slug)
            .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Err(ApiError::conflict(format!(
            "slug '{}' is already in use",
            fields.slug
        )));
    }

    let persisted = owned_images(&state, &id)?;
    let plan =
        gallery::plan(&persisted, &sub.desired, sub.uploads.len()).map_err(gallery_error)?;
    log_skipped(&id, &plan.skipped);

    let created = gallery::stage_uploads(state.media.as_ref(), &id, &plan, &sub.uploads)
        .await
        .map_err(gallery_error)?;

    let record = NewsRecord {
        id: id.clone(),
        slug: fields.slug,
        published: fields.published,
        published_on: fields.published_on,
        translations: fields.translations,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };

    let write = plan.write_set(created.clone());
    if let Err(e) = state.db.save_news(&record, &write) {
        gallery::sweep_removed(state.media.as_ref(), &created).await;
        return Err(ApiError::internal(e.to_string()));
    }

    // Row is committed; the orphaned files can go now
    gallery::sweep_removed(state.media.as_ref(), &plan.deletes).await;

    let images = owned_images(&state, &id)?;
    tracing::debug!(news_id = %id, "Updated news item");
    Ok(JSend::success(news_to_response(&record, &images)))
}

pub async fn get_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<NewsResponse>>, ApiError> {
    let news = state
        .db
        .get_news(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("News item not found"))?;

    let images = owned_images(&state, &id)?;
    Ok(JSend::success(news_to_response(&news, &images)))
}

pub async fn list_news(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListParams>,
) -> Result<Json<JSendPaginated<NewsResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let all = state
        .db
        .list_news(false)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let total = all.len() as u64;
    let mut items = Vec::new();
    for news in all
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
    {
        let images = owned_images(&state, &news.id)?;
        items.push(news_to_response(news, &images));
    }

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn delete_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let removed = state
        .db
        .delete_news(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("News item not found"))?;

    // Cascade is committed; sweep the backing files
    gallery::sweep_removed(state.media.as_ref(), &removed).await;

    tracing::debug!(news_id = %id, images = removed.len(), "Deleted news item");
    Ok(JSend::success(()))
}

// ============================================================================
// Public handlers
// ============================================================================

pub async fn list_published_news(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<PublicListParams>,
) -> Result<Json<JSendPaginated<PublicNewsResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let published = state
        .db
        .list_news(true)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let total = published.len() as u64;
    let mut items = Vec::new();
    for news in published
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
    {
        let images = owned_images(&state, &news.id)?;
        items.push(news_to_public(news, params.locale, &images)?);
    }

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn get_published_news(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    AppQuery(params): AppQuery<PublicGetParams>,
) -> Result<Json<JSend<PublicNewsResponse>>, ApiError> {
    let news = state
        .db
        .get_news_by_slug(&slug)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .filter(|n| n.published)
        .ok_or_else(|| ApiError::not_found("News item not found"))?;

    let images = owned_images(&state, &news.id)?;
    Ok(JSend::success(news_to_public(&news, params.locale, &images)?))
}

// ============================================================================
// Helpers
// ============================================================================

fn owned_images(state: &AppState, owner_id: &str) -> Result<Vec<ImageRecord>, ApiError> {
    state
        .db
        .images_for_owner(owner_id)
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn news_to_response(news: &NewsRecord, images: &[ImageRecord]) -> NewsResponse {
    NewsResponse {
        id: news.id.clone(),
        slug: news.slug.clone(),
        published: news.published,
        published_on: news.published_on.to_string(),
        translations: news.translations.clone(),
        images: images_to_responses(images),
        created_at: news.created_at.to_rfc3339(),
        updated_at: news.updated_at.to_rfc3339(),
    }
}

fn news_to_public(
    news: &NewsRecord,
    locale: Locale,
    images: &[ImageRecord],
) -> Result<PublicNewsResponse, ApiError> {
    let (served, translation) = locale
        .resolve(&news.translations)
        .ok_or_else(|| ApiError::internal("News item has no translations"))?;

    Ok(PublicNewsResponse {
        slug: news.slug.clone(),
        locale: served,
        title: translation.title.clone(),
        body: translation.body.clone(),
        published_on: news.published_on.to_string(),
        images: images_to_responses(images),
    })
}
