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
use crate::storage::models::{ImageRecord, Locale, ShowingRecord, WorkRecord, WorkTranslation};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct WorkResponse {
    pub id: String,
    pub slug: String,
    pub year: Option<i32>,
    pub translations: BTreeMap<Locale, WorkTranslation>,
    pub showings: Vec<ShowingResponse>,
    pub images: Vec<ImageResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct PublicWorkResponse {
    pub slug: String,
    /// The locale actually served (after fallback)
    pub locale: Locale,
    pub title: String,
    pub summary: Option<String>,
    pub body: String,
    pub year: Option<i32>,
    pub showings: Vec<ShowingResponse>,
    pub images: Vec<ImageResponse>,
}

#[derive(Debug, Serialize)]
pub struct ShowingResponse {
    pub date: String,
    pub venue: String,
    pub city: Option<String>,
    pub note: Option<String>,
}

/// One entry of the `showings` JSON array in a work submission
#[derive(Debug, Clone, Deserialize)]
pub struct ShowingSubmission {
    pub date: NaiveDate,
    pub venue: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
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

/// Everything pulled out of a work create/update multipart form
#[derive(Default)]
struct WorkSubmission {
    slug: Option<String>,
    year: Option<i32>,
    translations: Option<BTreeMap<Locale, WorkTranslation>>,
    showings: Vec<ShowingSubmission>,
    desired: Vec<DesiredImage>,
    uploads: Vec<NewUpload>,
}

struct ValidWork {
    slug: String,
    year: Option<i32>,
    translations: BTreeMap<Locale, WorkTranslation>,
}

async fn collect_submission(
    multipart: &mut Multipart,
    max_upload_size: u64,
) -> Result<WorkSubmission, ApiError> {
    let mut sub = WorkSubmission::default();

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
            "year" => {
                let text = read_text_field(field, "year").await?;
                if !text.trim().is_empty() {
                    let year = text.trim().parse::<i32>().map_err(|e| {
                        ApiError::bad_request(format!("Invalid year: {e}"))
                    })?;
                    sub.year = Some(year);
                }
            }
            "translations" => {
                let text = read_text_field(field, "translations").await?;
                let parsed: BTreeMap<Locale, WorkTranslation> = serde_json::from_str(&text)
                    .map_err(|e| {
                        ApiError::bad_request(format!(
                            "translations must be a JSON object keyed by locale: {e}"
                        ))
                    })?;
                sub.translations = Some(parsed);
            }
            "showings" => {
                let text = read_text_field(field, "showings").await?;
                let parsed: Vec<ShowingSubmission> =
                    serde_json::from_str(&text).map_err(|e| {
                        ApiError::bad_request(format!(
                            "showings must be a JSON array of performance dates: {e}"
                        ))
                    })?;
                sub.showings = parsed;
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

fn validate(sub: &WorkSubmission) -> Result<ValidWork, ApiError> {
    let slug = sub
        .slug
        .clone()
        .ok_or_else(|| ApiError::bad_request("slug field is required"))?;
    if slug.trim().is_empty() {
        return Err(ApiError::bad_request("slug must not be empty"));
    }

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

    for showing in &sub.showings {
        if showing.venue.trim().is_empty() {
            return Err(ApiError::bad_request("showing venue must not be empty"));
        }
    }

    Ok(ValidWork {
        slug,
        year: sub.year,
        translations,
    })
}

fn build_showings(work_id: &str, submissions: &[ShowingSubmission]) -> Vec<ShowingRecord> {
    submissions
        .iter()
        .map(|s| ShowingRecord {
            id: uuid::Uuid::new_v4().to_string(),
            work_id: work_id.to_string(),
            date: s.date,
            venue: s.venue.clone(),
            city: s.city.clone(),
            note: s.note.clone(),
        })
        .collect()
}

// ============================================================================
// Admin handlers
// ============================================================================

pub async fn create_work(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<WorkResponse>>, ApiError> {
    let sub = collect_submission(&mut multipart, state.config.max_upload_size).await?;
    let fields = validate(&sub)?;

    if state
        .db
        .work_slug_exists(&fields.slug)
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Err(ApiError::conflict(format!(
            "slug '{}' is already in use",
            fields.slug
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();

    let plan = gallery::plan(&[], &sub.desired, sub.uploads.len()).map_err(gallery_error)?;
    log_skipped(&id, &plan.skipped);

    // Phase 1: store the uploaded files
    let created = gallery::stage_uploads(state.media.as_ref(), &id, &plan, &sub.uploads)
        .await
        .map_err(gallery_error)?;

    let now = Utc::now();
    let record = WorkRecord {
        id: id.clone(),
        slug: fields.slug.clone(),
        year: fields.year,
        translations: fields.translations,
        created_at: now,
        updated_at: now,
    };
    let showings = build_showings(&id, &sub.showings);

    // Phase 2: commit the row, showings, and gallery as one transaction
    let write = plan.write_set(created.clone());
    if let Err(e) = state.db.save_work(&record, &showings, &write) {
        // Best-effort cleanup of the blobs staged for this save
        gallery::sweep_removed(state.media.as_ref(), &created).await;
        return Err(ApiError::internal(e.to_string()));
    }

    tracing::debug!(work_id = %id, slug = %record.slug, "Created work");
    work_response(&state, &record)
}

pub async fn update_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<JSend<WorkResponse>>, ApiError> {
    let existing = state
        .db
        .get_work(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Work not found"))?;

    let sub = collect_submission(&mut multipart, state.config.max_upload_size).await?;
    let fields = validate(&sub)?;

    if fields.slug != existing.slug
        && state
            .db
            .work_slug_exists(&fields.slug)
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

    let record = WorkRecord {
        id: id.clone(),
        slug: fields.slug,
        year: fields.year,
        translations: fields.translations,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };
    let showings = build_showings(&id, &sub.showings);

    let write = plan.write_set(created.clone());
    if let Err(e) = state.db.save_work(&record, &showings, &write) {
        gallery::sweep_removed(state.media.as_ref(), &created).await;
        return Err(ApiError::internal(e.to_string()));
    }

    // Row is committed; the orphaned files can go now
    gallery::sweep_removed(state.media.as_ref(), &plan.deletes).await;

    tracing::debug!(work_id = %id, "Updated work");
    work_response(&state, &record)
}

pub async fn get_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<WorkResponse>>, ApiError> {
    let work = state
        .db
        .get_work(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Work not found"))?;

    work_response(&state, &work)
}

pub async fn list_works(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListParams>,
) -> Result<Json<JSendPaginated<WorkResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let all = state
        .db
        .list_works()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let total = all.len() as u64;
    let mut items = Vec::new();
    for work in all
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
    {
        items.push(work_to_response(&state, work)?);
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

pub async fn delete_work(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let removed = state
        .db
        .delete_work(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Work not found"))?;

    // Cascade is committed; sweep the backing files
    gallery::sweep_removed(state.media.as_ref(), &removed).await;

    tracing::debug!(work_id = %id, images = removed.len(), "Deleted work");
    Ok(JSend::success(()))
}

// ============================================================================
// Public handlers
// ============================================================================

pub async fn list_public_works(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<PublicListParams>,
) -> Result<Json<JSendPaginated<PublicWorkResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let all = state
        .db
        .list_works()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let total = all.len() as u64;
    let mut items = Vec::new();
    for work in all
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
    {
        items.push(work_to_public(&state, work, params.locale)?);
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

pub async fn get_public_work(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    AppQuery(params): AppQuery<PublicGetParams>,
) -> Result<Json<JSend<PublicWorkResponse>>, ApiError> {
    let work = state
        .db
        .get_work_by_slug(&slug)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Work not found"))?;

    Ok(JSend::success(work_to_public(&state, &work, params.locale)?))
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

fn showings_to_responses(showings: &[ShowingRecord]) -> Vec<ShowingResponse> {
    showings
        .iter()
        .map(|s| ShowingResponse {
            date: s.date.to_string(),
            venue: s.venue.clone(),
            city: s.city.clone(),
            note: s.note.clone(),
        })
        .collect()
}

fn work_response(
    state: &AppState,
    work: &WorkRecord,
) -> Result<Json<JSend<WorkResponse>>, ApiError> {
    Ok(JSend::success(work_to_response(state, work)?))
}

fn work_to_response(state: &AppState, work: &WorkRecord) -> Result<WorkResponse, ApiError> {
    let images = owned_images(state, &work.id)?;
    let showings = state
        .db
        .showings_for_work(&work.id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(WorkResponse {
        id: work.id.clone(),
        slug: work.slug.clone(),
        year: work.year,
        translations: work.translations.clone(),
        showings: showings_to_responses(&showings),
        images: images_to_responses(&images),
        created_at: work.created_at.to_rfc3339(),
        updated_at: work.updated_at.to_rfc3339(),
    })
}

fn work_to_public(
    state: &AppState,
    work: &WorkRecord,
    locale: Locale,
) -> Result<PublicWorkResponse, ApiError> {
    let (served, translation) = locale
        .resolve(&work.translations)
        .ok_or_else(|| ApiError::internal("Work has no translations"))?;

    let images = owned_images(state, &work.id)?;
    let showings = state
        .db
        .showings_for_work(&work.id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(PublicWorkResponse {
        slug: work.slug.clone(),
        locale: served,
        title: translation.title.clone(),
        summary: translation.summary.clone(),
        body: translation.body.clone(),
        year: work.year,
        showings: showings_to_responses(&showings),
        images: images_to_responses(&images),
    })
}
