use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crown_types::api::{
    ChangePasswordRequest, Claims, ListingCard, Page, UpdateProfileRequest, UserProfile,
    UserPublic,
};

use crate::auth::{hash_password, verify_password};
use crate::convert::{user_profile, user_public};
use crate::error::{ApiError, ApiResult};
use crate::listings::cards_for;
use crate::pagination::PageQuery;
use crate::state::AppState;
use crate::uploads;

fn current_user(state: &AppState, claims: &Claims) -> ApiResult<crown_db::models::UserRow> {
    state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthenticated)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserProfile>> {
    let user = current_user(&state, &claims)?;
    Ok(Json(user_profile(&user)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let user = current_user(&state, &claims)?;

    let username = req.username.unwrap_or_else(|| user.username.clone());
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::InvalidArgument(
            "Username must be between 3 and 32 characters.".into(),
        ));
    }
    if username != user.username && state.db.username_taken_by_other(&username, &user.id)? {
        return Err(ApiError::InvalidArgument("Username is already taken.".into()));
    }

    let first_name = req.first_name.unwrap_or_else(|| user.first_name.clone());
    let last_name = req.last_name.unwrap_or_else(|| user.last_name.clone());
    let phone = req.phone.unwrap_or_else(|| user.phone.clone());
    let avatar_url = req.avatar_url.or_else(|| user.avatar_url.clone());

    state.db.update_profile(
        &user.id,
        &username,
        &first_name,
        &last_name,
        &phone,
        avatar_url.as_deref(),
    )?;

    let updated = current_user(&state, &claims)?;
    Ok(Json(user_profile(&updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = current_user(&state, &claims)?;

    if !verify_password(&req.current_password, &user.password)? {
        return Err(ApiError::InvalidArgument("Current password is incorrect.".into()));
    }
    if req.new_password.len() < 8 {
        return Err(ApiError::InvalidArgument(
            "Password must be at least 8 characters.".into(),
        ));
    }
    if req.new_password != req.new_password_confirm {
        return Err(ApiError::InvalidArgument("Passwords do not match.".into()));
    }

    let hash = hash_password(&req.new_password)?;
    state.db.set_password(&user.id, &hash)?;
    Ok(Json(serde_json::json!({ "message": "Password changed." })))
}

/// PUT /users/me/avatar/ — raw image bytes in, public URL out.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> ApiResult<Json<UserProfile>> {
    let user = current_user(&state, &claims)?;

    let url = uploads::save_media(&state.media_dir, "avatars", &bytes).await?;
    state.db.set_avatar(&user.id, &url)?;
    if let Some(old) = user.avatar_url.as_deref() {
        uploads::remove_media(&state.media_dir, old).await;
    }

    let updated = current_user(&state, &claims)?;
    Ok(Json(user_profile(&updated)))
}

pub async fn public_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UserPublic>> {
    let user = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .filter(|u| u.is_active)
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user_public(&user)))
}

/// GET /users/{id}/listings/ — a seller's active listings, newest first.
pub async fn seller_listings(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<ListingCard>>> {
    let seller = state
        .db
        .get_user_by_id(&user_id.to_string())?
        .filter(|u| u.is_active)
        .ok_or(ApiError::NotFound("User"))?;

    let (limit, offset) = page.limits();
    let (rows, count) = state.db.listings_by_seller(&seller.id, true, limit, offset)?;

    let viewer = crate::middleware::optional_claims(&headers);
    let cards = cards_for(&state, &rows, viewer.as_ref())?;
    Ok(Json(page.envelope(count, cards)))
}
