//! Repair shop directory, service menus and appointment booking.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use crown_db::models::{AppointmentRow, RepairShopRow, ServiceRow};
use crown_types::api::{
    AppointmentResponse, Claims, CreateAppointmentRequest, CreateReviewRequest, Page,
    RepairShopDetail, ReviewResponse, ServiceResponse, StoreCard, UpdateAppointmentRequest,
    UpsertServiceRequest, UpsertStoreRequest,
};
use crown_types::models::{AppointmentStatus, Capability};

use crate::convert::{
    self, appointment_response, load_user_map, repair_shop_card, repair_shop_detail,
    review_response, service_response,
};
use crate::error::{ApiError, ApiResult};
use crate::pagination::PageQuery;
use crate::state::AppState;
use crate::stores::ProfileQuery;
use crate::uploads;

fn require_shop_manager(claims: &Claims) -> ApiResult<()> {
    if !claims.role.has(Capability::CanManageRepairShop) {
        return Err(ApiError::PermissionDenied(
            "Only repair accounts can manage a repair shop.".into(),
        ));
    }
    Ok(())
}

fn get_own_shop(state: &AppState, claims: &Claims) -> ApiResult<RepairShopRow> {
    state
        .db
        .get_repair_shop_by_owner(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound("Repair shop"))
}

fn get_shop_by_slug(state: &AppState, slug: &str) -> ApiResult<RepairShopRow> {
    state
        .db
        .get_repair_shop_by_slug(slug)?
        .ok_or(ApiError::NotFound("Repair shop"))
}

fn detail_for(state: &AppState, row: &RepairShopRow) -> ApiResult<RepairShopDetail> {
    let owner = state
        .db
        .get_user_by_id(&row.owner_id)?
        .map(|u| convert::user_public(&u))
        .ok_or_else(|| anyhow::anyhow!("repair shop {} has no owner row", row.id))?;
    let (avg, count) = state.db.repair_shop_rating(&row.id)?;
    let services = state.db.services_for_shop(&row.id)?;
    Ok(repair_shop_detail(row, owner, avg, count, &services))
}

// -- Directory --

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
        let (rows, count) = db.db.search_repair_shops(&filter, limit, offset)?;
        let mut cards = Vec::with_capacity(rows.len());
        for row in &rows {
            let (avg, n) = db.db.repair_shop_rating(&row.id)?;
            cards.push(repair_shop_card(row, avg, n));
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
) -> ApiResult<Json<RepairShopDetail>> {
    let row = get_shop_by_slug(&state, &slug)?;
    Ok(Json(detail_for(&state, &row)?))
}

// -- Shop management --

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertStoreRequest>,
) -> ApiResult<impl IntoResponse> {
    require_shop_manager(&claims)?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::InvalidArgument("Shop name is required.".into()))?;

    if state
        .db
        .get_repair_shop_by_owner(&claims.sub.to_string())?
        .is_some()
    {
        return Err(ApiError::InvalidArgument(
            "You already have a repair shop.".into(),
        ));
    }

    let opening_hours = req
        .opening_hours
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".into());
    let row = RepairShopRow {
        id: Uuid::new_v4().to_string(),
        owner_id: claims.sub.to_string(),
        name: name.to_string(),
        slug: String::new(),
        description: req.description.unwrap_or_default(),
        logo_url: None,
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
    let created = state.db.insert_repair_shop(&row)?;
    Ok((StatusCode::CREATED, Json(detail_for(&state, &created)?)))
}

pub async fn mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<RepairShopDetail>> {
    let row = get_own_shop(&state, &claims)?;
    Ok(Json(detail_for(&state, &row)?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertStoreRequest>,
) -> ApiResult<Json<RepairShopDetail>> {
    let mut row = get_own_shop(&state, &claims)?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidArgument("Shop name cannot be empty.".into()));
        }
        row.name = name;
    }
    if let Some(v) = req.description {
        row.description = v;
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
    state.db.update_repair_shop(&row)?;

    let updated = get_own_shop(&state, &claims)?;
    Ok(Json(detail_for(&state, &updated)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let row = get_own_shop(&state, &claims)?;
    state.db.delete_repair_shop(&row.id)?;
    if let Some(logo) = row.logo_url.as_deref() {
        uploads::remove_media(&state.media_dir, logo).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_logo(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> ApiResult<Json<RepairShopDetail>> {
    let row = get_own_shop(&state, &claims)?;

    let url = uploads::save_media(&state.media_dir, "repair-shops", &bytes).await?;
    state.db.set_repair_shop_logo(&row.id, &url)?;
    if let Some(old) = row.logo_url.as_deref() {
        uploads::remove_media(&state.media_dir, old).await;
    }

    let updated = get_own_shop(&state, &claims)?;
    Ok(Json(detail_for(&state, &updated)?))
}

// -- Services --

pub async fn create_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpsertServiceRequest>,
) -> ApiResult<impl IntoResponse> {
    let shop = get_own_shop(&state, &claims)?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::InvalidArgument("Service name is required.".into()))?;

    let row = ServiceRow {
        id: Uuid::new_v4().to_string(),
        shop_id: shop.id,
        name: name.to_string(),
        description: req.description.unwrap_or_default(),
        price_from: req.price_from,
        price_to: req.price_to,
        duration_days: req.duration_days.map(|d| d as i64),
        created_at: String::new(),
    };
    let created = state.db.insert_service(&row)?;
    Ok((StatusCode::CREATED, Json(service_response(&created))))
}

pub async fn update_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(service_id): Path<Uuid>,
    Json(req): Json<UpsertServiceRequest>,
) -> ApiResult<Json<ServiceResponse>> {
    let shop = get_own_shop(&state, &claims)?;
    let mut row = state
        .db
        .get_service(&service_id.to_string(), &shop.id)?
        .ok_or(ApiError::NotFound("Service"))?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::InvalidArgument("Service name cannot be empty.".into()));
        }
        row.name = name;
    }
    if let Some(v) = req.description {
        row.description = v;
    }
    if let Some(v) = req.price_from {
        row.price_from = Some(v);
    }
    if let Some(v) = req.price_to {
        row.price_to = Some(v);
    }
    if let Some(v) = req.duration_days {
        row.duration_days = Some(v as i64);
    }
    state.db.update_service(&row)?;

    let updated = state
        .db
        .get_service(&row.id, &shop.id)?
        .ok_or(ApiError::NotFound("Service"))?;
    Ok(Json(service_response(&updated)))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(service_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let shop = get_own_shop(&state, &claims)?;
    state
        .db
        .get_service(&service_id.to_string(), &shop.id)?
        .ok_or(ApiError::NotFound("Service"))?;
    state.db.delete_service(&service_id.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Reviews --

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ReviewResponse>>> {
    let shop = get_shop_by_slug(&state, &slug)?;

    let (limit, offset) = page.limits();
    let (rows, count) = state.db.repair_reviews(&shop.id, limit, offset)?;

    let author_ids: Vec<String> = rows.iter().map(|r| r.author_id.clone()).collect();
    let users = load_user_map(&state.db, &author_ids)?;
    let reviews = rows
        .iter()
        .map(|r| review_response(r, convert::user_or_placeholder(&users, &r.author_id)))
        .collect();
    Ok(Json(page.envelope(count, reviews)))
}

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

    let shop = get_shop_by_slug(&state, &slug)?;
    let author_id = claims.sub.to_string();
    if shop.owner_id == author_id {
        return Err(ApiError::InvalidArgument(
            "You cannot review your own shop.".into(),
        ));
    }
    if state.db.has_reviewed_shop(&author_id, &shop.id)? {
        return Err(ApiError::InvalidArgument(
            "You have already reviewed this shop.".into(),
        ));
    }

    let row = state.db.insert_repair_review(
        &Uuid::new_v4().to_string(),
        &author_id,
        &shop.id,
        req.rating as i64,
        req.content.as_deref().unwrap_or(""),
    )?;

    let users = load_user_map(&state.db, std::slice::from_ref(&author_id))?;
    let author = convert::user_or_placeholder(&users, &author_id);
    Ok((StatusCode::CREATED, Json(review_response(&row, author))))
}

// -- Appointments --

fn appointment_dto(state: &AppState, row: &AppointmentRow) -> ApiResult<AppointmentResponse> {
    let users = load_user_map(&state.db, std::slice::from_ref(&row.customer_id))?;
    let customer = convert::user_or_placeholder(&users, &row.customer_id);
    let service = match row.service_id.as_deref() {
        Some(service_id) => state.db.get_service(service_id, &row.shop_id)?,
        None => None,
    };
    Ok(appointment_response(row, customer, service.as_ref()))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Json(req): Json<CreateAppointmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let shop = get_shop_by_slug(&state, &slug)?;
    let customer_id = claims.sub.to_string();
    if shop.owner_id == customer_id {
        return Err(ApiError::InvalidArgument(
            "You cannot book an appointment at your own shop.".into(),
        ));
    }
    if req.scheduled_at <= chrono::Utc::now() {
        return Err(ApiError::InvalidArgument(
            "Appointments must be scheduled in the future.".into(),
        ));
    }

    let service_id = match req.service_id {
        Some(id) => {
            // Must belong to this shop
            state
                .db
                .get_service(&id.to_string(), &shop.id)?
                .ok_or(ApiError::NotFound("Service"))?;
            Some(id.to_string())
        }
        None => None,
    };

    let row = AppointmentRow {
        id: Uuid::new_v4().to_string(),
        shop_id: shop.id,
        service_id,
        customer_id,
        scheduled_at: req.scheduled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        status: AppointmentStatus::Pending.as_str().to_string(),
        notes: req.notes.unwrap_or_default(),
        created_at: String::new(),
    };
    let created = state.db.insert_appointment(&row)?;
    Ok((StatusCode::CREATED, Json(appointment_dto(&state, &created)?)))
}

/// The shop owner sees every booking; everyone else only their own.
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(slug): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<AppointmentResponse>>> {
    let shop = get_shop_by_slug(&state, &slug)?;
    let user_id = claims.sub.to_string();

    let (limit, offset) = page.limits();
    let (rows, count) = if shop.owner_id == user_id {
        state.db.appointments_for_shop(&shop.id, limit, offset)?
    } else {
        state
            .db
            .appointments_for_customer(&shop.id, &user_id, limit, offset)?
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in &rows {
        out.push(appointment_dto(&state, row)?);
    }
    Ok(Json(page.envelope(count, out)))
}

/// Owners can move an appointment through its lifecycle; customers may only
/// cancel their own booking.
pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((slug, appointment_id)): Path<(String, Uuid)>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> ApiResult<Json<AppointmentResponse>> {
    let shop = get_shop_by_slug(&state, &slug)?;
    let row = state
        .db
        .get_appointment(&appointment_id.to_string(), &shop.id)?
        .ok_or(ApiError::NotFound("Appointment"))?;

    let user_id = claims.sub.to_string();
    let is_owner = shop.owner_id == user_id;
    let is_customer = row.customer_id == user_id;
    if !is_owner && !is_customer {
        return Err(ApiError::NotFound("Appointment"));
    }
    if !is_owner && req.status != AppointmentStatus::Cancelled {
        return Err(ApiError::PermissionDenied(
            "Customers can only cancel their appointments.".into(),
        ));
    }

    state
        .db
        .set_appointment_status(&row.id, req.status.as_str())?;
    let updated = state
        .db
        .get_appointment(&row.id, &shop.id)?
        .ok_or(ApiError::NotFound("Appointment"))?;
    Ok(Json(appointment_dto(&state, &updated)?))
}
