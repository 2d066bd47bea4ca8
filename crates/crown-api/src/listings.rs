//! Listing catalog: search, CRUD, images and saves.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crown_db::models::ListingRow;
use crown_db::queries::listings::ListingFilter;
use crown_types::api::{
    Claims, CreateListingRequest, ListingCard, ListingDetail, ListingImageResponse, Page,
    SavedResponse, UpdateListingRequest,
};
use crown_types::models::{Capability, ListingStatus};

use crate::convert::{self, image_response, listing_card, listing_detail, load_user_map};
use crate::error::{ApiError, ApiResult};
use crate::middleware::optional_claims;
use crate::pagination::PageQuery;
use crate::state::AppState;
use crate::uploads;

const MAX_IMAGES_PER_LISTING: u64 = 10;

/// Search parameters. `condition` and `movement_type` accept comma-separated
/// lists; unknown sort keys fall back to newest-first.
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub movement_type: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub year_min: Option<i64>,
    #[serde(default)]
    pub year_max: Option<i64>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

fn csv_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl ListingQuery {
    fn page_query(&self) -> PageQuery {
        let mut page = PageQuery::default();
        if let Some(p) = self.page {
            page.page = p;
        }
        if let Some(size) = self.page_size {
            page.page_size = size;
        }
        page
    }

    fn filter(&self) -> ListingFilter {
        ListingFilter {
            brand: self.brand.clone(),
            model: self.model.clone(),
            conditions: csv_list(self.condition.as_deref()),
            movement_types: csv_list(self.movement_type.as_deref()),
            min_price: self.min_price,
            max_price: self.max_price,
            city: self.city.clone(),
            country: self.country.clone(),
            year_min: self.year_min,
            year_max: self.year_max,
            search: self.search.clone(),
        }
    }
}

/// Builds cards for a page of listings with three batch queries: images,
/// sellers and the viewer's saved set.
pub fn cards_for(
    state: &AppState,
    rows: &[ListingRow],
    viewer: Option<&Claims>,
) -> ApiResult<Vec<ListingCard>> {
    let listing_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let seller_ids: Vec<String> = rows.iter().map(|r| r.seller_id.clone()).collect();

    let images = state.db.images_for_listings(&listing_ids)?;
    let mut by_listing: HashMap<&str, Vec<_>> = HashMap::new();
    for img in &images {
        by_listing.entry(img.listing_id.as_str()).or_default().push(img.clone());
    }

    let users = load_user_map(&state.db, &seller_ids)?;
    let saved: Vec<String> = match viewer {
        Some(claims) => state.db.saved_ids_for_user(&claims.sub.to_string(), &listing_ids)?,
        None => vec![],
    };

    Ok(rows
        .iter()
        .map(|row| {
            listing_card(
                row,
                by_listing.get(row.id.as_str()).map(Vec::as_slice).unwrap_or(&[]),
                convert::user_or_placeholder(&users, &row.seller_id),
                saved.contains(&row.id),
            )
        })
        .collect())
}

fn detail_for(state: &AppState, row: &ListingRow, viewer: Option<&Claims>) -> ApiResult<ListingDetail> {
    let images = state.db.images_for_listing(&row.id)?;
    let seller = state
        .db
        .get_user_by_id(&row.seller_id)?
        .map(|u| convert::user_public(&u))
        .ok_or_else(|| anyhow::anyhow!("listing {} has no seller row", row.id))?;
    let is_saved = match viewer {
        Some(claims) => state.db.is_saved(&claims.sub.to_string(), &row.id)?,
        None => false,
    };
    Ok(listing_detail(row, &images, seller, is_saved))
}

fn is_owner_or_admin(claims: &Claims, row: &ListingRow) -> bool {
    claims.sub.to_string() == row.seller_id || claims.role.has(Capability::IsAdmin)
}

fn get_owned_listing(state: &AppState, claims: &Claims, id: Uuid) -> ApiResult<ListingRow> {
    let row = state
        .db
        .get_listing(&id.to_string())?
        .ok_or(ApiError::NotFound("Listing"))?;
    if !is_owner_or_admin(claims, &row) {
        return Err(ApiError::denied());
    }
    Ok(row)
}

// -- Handlers --

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Json<Page<ListingCard>>> {
    let filter = query.filter();
    let sort = query.sort.clone().unwrap_or_else(|| "-created_at".into());
    let page = query.page_query();
    let (limit, offset) = page.limits();
    let viewer = optional_claims(&headers);

    // Run the blocking DB work off the async runtime
    let db = state.clone();
    let (count, cards) = tokio::task::spawn_blocking(move || {
        let rows = db.db.search_listings(&filter, &sort, limit, offset)?;
        let count = db.db.count_listings(&filter)?;
        let cards = cards_for(&db, &rows, viewer.as_ref())?;
        Ok::<_, ApiError>((count, cards))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::from(anyhow::anyhow!("search task failed"))
    })??;

    Ok(Json(page.envelope(count, cards)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateListingRequest>,
) -> ApiResult<impl IntoResponse> {
    if !claims.role.has(Capability::CanSell) {
        return Err(ApiError::PermissionDenied(
            "Only seller accounts can create listings.".into(),
        ));
    }
    if req.title.trim().is_empty() || req.brand.trim().is_empty() || req.model.trim().is_empty() {
        return Err(ApiError::InvalidArgument(
            "Title, brand and model are required.".into(),
        ));
    }
    if req.price <= 0.0 {
        return Err(ApiError::InvalidArgument("Price must be positive.".into()));
    }

    let row = ListingRow {
        id: Uuid::new_v4().to_string(),
        seller_id: claims.sub.to_string(),
        title: req.title,
        brand: req.brand,
        model: req.model,
        reference_number: req.reference_number.unwrap_or_default(),
        year: req.year.map(|y| y as i64),
        condition: req.condition.as_str().to_string(),
        movement_type: req.movement_type.map(|m| m.as_str().to_string()),
        case_material: req.case_material.unwrap_or_default(),
        case_diameter_mm: req.case_diameter_mm,
        price: req.price,
        currency: req.currency.unwrap_or_else(|| "USD".into()),
        description: req.description.unwrap_or_default(),
        status: ListingStatus::Active.as_str().to_string(),
        views_count: 0,
        location_city: req.location_city.unwrap_or_default(),
        location_country: req.location_country.unwrap_or_default(),
        created_at: String::new(),
        updated_at: String::new(),
    };
    state.db.insert_listing(&row)?;

    let created = state
        .db
        .get_listing(&row.id)?
        .ok_or_else(|| anyhow::anyhow!("listing vanished right after insert"))?;
    let detail = detail_for(&state, &created, Some(&claims))?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ListingDetail>> {
    let row = state
        .db
        .get_listing(&id.to_string())?
        .ok_or(ApiError::NotFound("Listing"))?;

    let viewer = optional_claims(&headers);

    // Non-active listings are only visible to their owner (and admins)
    if row.status != ListingStatus::Active.as_str() {
        let allowed = viewer
            .as_ref()
            .map(|c| is_owner_or_admin(c, &row))
            .unwrap_or(false);
        if !allowed {
            return Err(ApiError::NotFound("Listing"));
        }
    }

    // Best-effort counter; a lost increment never fails the request
    if let Err(e) = state.db.increment_views(&row.id) {
        warn!("Failed to bump views for {}: {:#}", row.id, e);
    }

    let detail = detail_for(&state, &row, viewer.as_ref())?;
    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateListingRequest>,
) -> ApiResult<Json<ListingDetail>> {
    let mut row = get_owned_listing(&state, &claims, id)?;

    // Removal goes through DELETE so it cannot be undone by a later PATCH
    if req.status == Some(ListingStatus::Removed) {
        return Err(ApiError::InvalidArgument(
            "Use the delete endpoint to remove a listing.".into(),
        ));
    }
    if let Some(price) = req.price {
        if price <= 0.0 {
            return Err(ApiError::InvalidArgument("Price must be positive.".into()));
        }
    }

    if let Some(v) = req.title {
        row.title = v;
    }
    if let Some(v) = req.brand {
        row.brand = v;
    }
    if let Some(v) = req.model {
        row.model = v;
    }
    if let Some(v) = req.reference_number {
        row.reference_number = v;
    }
    if let Some(v) = req.year {
        row.year = Some(v as i64);
    }
    if let Some(v) = req.condition {
        row.condition = v.as_str().to_string();
    }
    if let Some(v) = req.movement_type {
        row.movement_type = Some(v.as_str().to_string());
    }
    if let Some(v) = req.case_material {
        row.case_material = v;
    }
    if let Some(v) = req.case_diameter_mm {
        row.case_diameter_mm = Some(v);
    }
    if let Some(v) = req.price {
        row.price = v;
    }
    if let Some(v) = req.currency {
        row.currency = v;
    }
    if let Some(v) = req.description {
        row.description = v;
    }
    if let Some(v) = req.location_city {
        row.location_city = v;
    }
    if let Some(v) = req.location_country {
        row.location_country = v;
    }
    if let Some(v) = req.status {
        row.status = v.as_str().to_string();
    }
    state.db.update_listing(&row)?;

    let updated = state
        .db
        .get_listing(&row.id)?
        .ok_or(ApiError::NotFound("Listing"))?;
    Ok(Json(detail_for(&state, &updated, Some(&claims))?))
}

/// Soft delete: the row survives (conversations keep their context) but the
/// listing disappears from every public surface.
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let row = get_owned_listing(&state, &claims, id)?;
    state
        .db
        .set_listing_status(&row.id, ListingStatus::Removed.as_str())?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /listings/mine/ — the caller's listings, every status included.
pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ListingCard>>> {
    let (limit, offset) = page.limits();
    let (rows, count) =
        state
            .db
            .listings_by_seller(&claims.sub.to_string(), false, limit, offset)?;
    let cards = cards_for(&state, &rows, Some(&claims))?;
    Ok(Json(page.envelope(count, cards)))
}

// -- Saves --

pub async fn save(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SavedResponse>> {
    let row = state
        .db
        .get_listing(&id.to_string())?
        .filter(|r| r.status == ListingStatus::Active.as_str())
        .ok_or(ApiError::NotFound("Listing"))?;

    state
        .db
        .save_listing(&Uuid::new_v4().to_string(), &claims.sub.to_string(), &row.id)?;
    Ok(Json(SavedResponse { saved: true }))
}

pub async fn unsave(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SavedResponse>> {
    state
        .db
        .unsave_listing(&claims.sub.to_string(), &id.to_string())?;
    Ok(Json(SavedResponse { saved: false }))
}

pub async fn saved(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ListingCard>>> {
    let (limit, offset) = page.limits();
    let (rows, count) =
        state
            .db
            .saved_listings_for_user(&claims.sub.to_string(), limit, offset)?;
    let cards = cards_for(&state, &rows, Some(&claims))?;
    Ok(Json(page.envelope(count, cards)))
}

// -- Images --

/// POST /listings/{id}/images/ — raw image bytes. The first image on a
/// listing becomes its primary automatically.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let row = get_owned_listing(&state, &claims, id)?;

    let existing = state.db.count_images(&row.id)?;
    if existing >= MAX_IMAGES_PER_LISTING {
        return Err(ApiError::InvalidArgument(format!(
            "A listing can have at most {MAX_IMAGES_PER_LISTING} images."
        )));
    }

    let url = uploads::save_media(&state.media_dir, "listings", &bytes).await?;
    let image_id = Uuid::new_v4().to_string();
    state
        .db
        .insert_image(&image_id, &row.id, &url, existing == 0, existing as i64)?;

    let image = state
        .db
        .get_image(&image_id, &row.id)?
        .ok_or_else(|| anyhow::anyhow!("image vanished right after insert"))?;
    Ok((StatusCode::CREATED, Json(image_response(&image))))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let row = get_owned_listing(&state, &claims, id)?;

    let deleted = state
        .db
        .delete_image(&image_id.to_string(), &row.id)?
        .ok_or(ApiError::NotFound("Image"))?;
    uploads::remove_media(&state.media_dir, &deleted.url).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_primary_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, image_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ListingImageResponse>> {
    let row = get_owned_listing(&state, &claims, id)?;

    if !state.db.set_primary_image(&row.id, &image_id.to_string())? {
        return Err(ApiError::NotFound("Image"));
    }
    let image = state
        .db
        .get_image(&image_id.to_string(), &row.id)?
        .ok_or(ApiError::NotFound("Image"))?;
    Ok(Json(image_response(&image)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_list_splits_and_trims() {
        assert_eq!(csv_list(Some("good, excellent")), vec!["good", "excellent"]);
        assert_eq!(csv_list(Some("automatic")), vec!["automatic"]);
        assert!(csv_list(Some("")).is_empty());
        assert!(csv_list(None).is_empty());
    }
}
