//! Store directory, reviews and promotion plans.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crown_db::models::StoreRow;
use crown_db::queries::stores::ProfileFilter;
use crown_types::api::{
    Claims, CreateReviewRequest, Page, PromotionResponse, PurchasePromotionRequest,
    ReviewResponse, StoreCard, StoreDetail, UpsertStoreRequest,
};
use crown_types::models::Capability;

use crate::convert::{
    self, load_user_map, promotion_response, review_response, store_card, store_detail,
};
use crate::error::{ApiError, ApiResult};
use crate::pagination::PageQuery;
use crate::state::AppState;
use crate::uploads;

/// Directory search parameters, shared with the repair-shop directory.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub featured: Option<bool>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl ProfileQuery {
    pub fn filter(&self) -> ProfileFilter {
        ProfileFilter {
            search: self.search.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            featured_only: self.featured.unwrap_or(false),
        }
    }

    pub fn page_query(&self) -> PageQuery {
        let mut page = PageQuery::default();
        if let Some(p) = self.page {
            page.page = p;
        }
        if let Some(size) = self.page_size {
            page.page_size = size;
        }
        page
    }
}

fn require_store_manager(claims: &Claims) -> ApiResult<()> {
    if !claims.role.has(Capability::CanManageStore) {
        return Err(ApiError::PermissionDenied(
            "Only store accounts can manage a store.".into(),
        ));
    }
    Ok(())
}

fn get_own_store(state: &AppState, claims: &Claims) -> ApiResult<StoreRow> {
    state
        .db
        .get_store_by_owner(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound("Store"))
}

fn detail_for(state: &AppState, row: &StoreRow) -> ApiResult<StoreDetail> {
    let owner = state
        .db
        .get_user_by_id(&row.owner_id)?
        .map(|u| convert::user_public(&u))
        .ok_or_else(|| anyhow::anyhow!("store {} has no owner row", row.id))?;
    let (avg, count) = state.db.store_rating(&row.id)?;
    let promotion = state.db.get_promotion(&row.id)?;
    Ok(store_detail(row, owner, avg, count, promotion.as_ref()))
}

// -- Handlers --

pub async fn directory(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> ApiResult<Json<Page<StoreCard>>> {
    let page = query.page_query();
    let (limit, offset) = page.limits();
    let filter = query.filter();

    // Run the blocking DB work off the async runtime
    let db = state.clone();
    let (count, cards) = tokio::task::spawn_blocking(move || {
        let (rows, count) = db.db.search_stores(&filter, limit, offset)?;
        let mut cards = Vec::with_capacity(rows.len());
        for row in &rows {
            let (avg, n) = db.db.store_rating(&row.id)?;
            cards.push(store_card(row, avg, n));
        }
        Ok::<_, ApiError>((count, cards))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::from(anyhow::anyhow!("directory task failed"))
    })??;

    Ok(Json(page.envelope(count, cards)))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<StoreDetail>> {
    let row = state
        .db
        .get_store_by_slug(&slug)?
        .ok_or(ApiError::NotFound("Store"))?;

    // Lapsed promotions are retired on read; refetch when that happened
    let row = if state.db.expire_promotion_if_lapsed(&row.id)? {
        state
            .db
            .get_store_by_slug(&slug)?
            .ok_or(ApiError::NotFound("Store"))?
    } else {
        row
    };

    Ok(Json(detail_for(&state, &row)?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertStoreRequest>,
) -> ApiResult<impl IntoResponse> {
    require_store_manager(&claims)?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::InvalidArgument("Store name is required.".into()))?;

    if state.db.get_store_by_owner(&claims.sub.to_string())?.is_some() {
        return Err(ApiError::InvalidArgument("You already have a store.".into()));
    }

    let opening_hours = req
        .opening_hours
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".into());
    let row = StoreRow {
        id: Uuid::new_v4().to_string(),
        owner_id: claims.sub.to_string(),
        name: name.to_string(),
        slug: String::new(),
        description: req.description.unwrap_or_default(),
        logo_url: None,
        website: req.website.unwrap_or_default(),
        phone: req.phone.unwrap_or_default(),
        email: req.email.unwrap_or_default(),
        address: req.address.unwrap_or_default(),
        city: req.city.unwrap_or_default(),
        country: req.country.unwrap_or_default(),
        latitude: req.latitude,
        longitude: req.longitude,
        opening_hours,
        is_featured: false,
        is_verified: false,
        created_at: String::new(),
        updated_at: String::new(),
    };
    let created = state.db.insert_store(&row)?;
    Ok((StatusCode::CREATED, Json(detail_for(&state, &created)?)))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<StoreDetail>> {
    let row = get_own_store(&state, &claims)?;
    Ok(Json(detail_for(&state, &row)?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertStoreRequest>,
) -> ApiResult<Json<StoreDetail>> {
    let mut row = get_own_store(&state, &claims)?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidArgument("Store name cannot be empty.".into()));
        }
        row.name = name;
    }
    if let Some(v) = req.description {
        row.description = v;
    }
    if let Some(v) = req.website {
        row.website = v;
    }
    if let Some(v) = req.phone {
        row.phone = v;
    }
    if let Some(v) = req.email {
        row.email = v;
    }
    if let Some(v) = req.address {
        row.address = v;
    }
    if let Some(v) = req.city {
        row.city = v;
    }
    if let Some(v) = req.country {
        row.country = v;
    }
    if let Some(v) = req.latitude {
        row.latitude = Some(v);
    }
    if let Some(v) = req.longitude {
        row.longitude = Some(v);
    }
    if let Some(v) = req.opening_hours {
        row.opening_hours = v.to_string();
    }
    state.db.update_store(&row)?;

    let updated = get_own_store(&state, &claims)?;
    Ok(Json(detail_for(&state, &updated)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let row = get_own_store(&state, &claims)?;
    state.db.delete_store(&row.id)?;
    if let Some(logo) = row.logo_url.as_deref() {
        uploads::remove_media(&state.media_dir, logo).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_logo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> ApiResult<Json<StoreDetail>> {
    let row = get_own_store(&state, &claims)?;

    let url = uploads::save_media(&state.media_dir, "stores", &bytes).await?;
    state.db.set_store_logo(&row.id, &url)?;
    if let Some(old) = row.logo_url.as_deref() {
        uploads::remove_media(&state.media_dir, old).await;
    }

    let updated = get_own_store(&state, &claims)?;
    Ok(Json(detail_for(&state, &updated)?))
}

// -- Reviews --

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ReviewResponse>>> {
    let store = state
        .db
        .get_store_by_slug(&slug)?
        .ok_or(ApiError::NotFound("Store"))?;

    let (limit, offset) = page.limits();
    let (rows, count) = state.db.store_reviews(&store.id, limit, offset)?;

    let author_ids: Vec<String> = rows.iter().map(|r| r.author_id.clone()).collect();
    let users = load_user_map(&state.db, &author_ids)?;
    let reviews = rows
        .iter()
        .map(|r| review_response(r, convert::user_or_placeholder(&users, &r.author_id)))
        .collect();
    Ok(Json(page.envelope(count, reviews)))
}

/// One review per author per store; owners cannot review themselves.
pub async fn create_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::InvalidArgument(
            "Rating must be between 1 and 5.".into(),
        ));
    }

    let store = state
        .db
        .get_store_by_slug(&slug)?
        .ok_or(ApiError::NotFound("Store"))?;
    let author_id = claims.sub.to_string();
    if store.owner_id == author_id {
        return Err(ApiError::InvalidArgument(
            "You cannot review your own store.".into(),
        ));
    }
    if state.db.has_reviewed_store(&author_id, &store.id)? {
        return Err(ApiError::InvalidArgument(
            "You have already reviewed this store.".into(),
        ));
    }

    let row = state.db.insert_store_review(
        &Uuid::new_v4().to_string(),
        &author_id,
        &store.id,
        req.rating as i64,
        req.content.as_deref().unwrap_or(""),
    )?;

    let users = load_user_map(&state.db, std::slice::from_ref(&author_id))?;
    let author = convert::user_or_placeholder(&users, &author_id);
    Ok((StatusCode::CREATED, Json(review_response(&row, author))))
}

// -- Promotions --

/// POST /stores/mine/promotion/ — purchase or renew a promotion plan.
/// Spotlight runs 30 days, featured 90; renewing restarts the window.
pub async fn purchase_promotion(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PurchasePromotionRequest>,
) -> ApiResult<impl IntoResponse> {
    let store = get_own_store(&state, &claims)?;
    let row = state.db.activate_promotion(
        &Uuid::new_v4().to_string(),
        &store.id,
        req.plan.as_str(),
        req.plan.duration_days(),
    )?;
    Ok((StatusCode::CREATED, Json(promotion_response(&row))))
}

pub async fn my_promotion(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PromotionResponse>> {
    let store = get_own_store(&state, &claims)?;
    state.db.expire_promotion_if_lapsed(&store.id)?;
    let row = state
        .db
        .get_promotion(&store.id)?
        .ok_or(ApiError::NotFound("Promotion"))?;
    Ok(Json(promotion_response(&row)))
}
