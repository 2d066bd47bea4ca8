//! Registration, login and the token lifecycle. Access tokens are short
//! lived; refresh tokens carry a jti so logout can blacklist them.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crown_db::models::UserRow;
use crown_types::api::{
    AccessTokenResponse, Claims, LoginRequest, LogoutRequest, PasswordResetConfirm,
    PasswordResetRequest, RefreshRequest, RegisterRequest, RegisterResponse, TokenResponse,
};
use crown_types::models::Role;

use crate::convert::user_profile;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const ACCESS_TTL_MINUTES: i64 = 30;
const REFRESH_TTL_DAYS: i64 = 30;

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("stored password hash is corrupt: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub(crate) fn create_token(secret: &str, user: &UserRow, token_type: &str) -> ApiResult<String> {
    let ttl = match token_type {
        "refresh" => chrono::Duration::days(REFRESH_TTL_DAYS),
        _ => chrono::Duration::minutes(ACCESS_TTL_MINUTES),
    };
    let claims = Claims {
        sub: crate::convert::parse_uuid(&user.id),
        role: Role::parse(&user.role).unwrap_or(Role::Buyer),
        token_type: token_type.to_string(),
        jti: Uuid::new_v4(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("token encoding failed: {}", e))?;
    Ok(token)
}

/// Decodes a refresh token, rejecting access tokens and blacklisted jtis.
fn decode_refresh(state: &AppState, token: &str) -> ApiResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated)?;

    if data.claims.token_type != "refresh" {
        return Err(ApiError::Unauthenticated);
    }
    if state.db.is_jti_revoked(&data.claims.jti.to_string())? {
        return Err(ApiError::Unauthenticated);
    }
    Ok(data.claims)
}

fn validate_password(password: &str, confirm: &str) -> ApiResult<()> {
    if password.len() < 8 {
        return Err(ApiError::InvalidArgument(
            "Password must be at least 8 characters.".into(),
        ));
    }
    if password != confirm {
        return Err(ApiError::InvalidArgument("Passwords do not match.".into()));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if !req.email.contains('@') {
        return Err(ApiError::InvalidArgument("Enter a valid email address.".into()));
    }
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(ApiError::InvalidArgument(
            "Username must be between 3 and 32 characters.".into(),
        ));
    }
    validate_password(&req.password, &req.password_confirm)?;

    // Admin accounts are never self-service
    let role = req.role.unwrap_or(Role::Buyer);
    if role == Role::Admin {
        return Err(ApiError::InvalidArgument("Invalid role.".into()));
    }

    if state.db.get_user_by_email(&req.email)?.is_some() {
        return Err(ApiError::InvalidArgument("Email is already registered.".into()));
    }
    if state.db.username_taken_by_other(&req.username, "")? {
        return Err(ApiError::InvalidArgument("Username is already taken.".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4().to_string();
    state.db.create_user(
        &user_id,
        &req.email,
        &req.username,
        &password_hash,
        req.first_name.as_deref().unwrap_or(""),
        req.last_name.as_deref().unwrap_or(""),
        role.as_str(),
    )?;

    // No mail transport here; the token is surfaced in the logs so the
    // operator (or a dev) can complete verification out of band.
    let token = Uuid::new_v4().to_string();
    state.db.create_verification_token(&token, &user_id)?;
    info!("Verification token for {}: {}", req.email, token);

    let user = state
        .db
        .get_user_by_id(&user_id)?
        .ok_or_else(|| anyhow::anyhow!("user vanished right after insert"))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email to verify the account.".into(),
            user: user_profile(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state
        .db
        .get_user_by_email(&req.email)?
        .ok_or(ApiError::Unauthenticated)?;

    if !verify_password(&req.password, &user.password)? {
        return Err(ApiError::Unauthenticated);
    }
    if !user.is_active {
        return Err(ApiError::PermissionDenied("This account is disabled.".into()));
    }

    let access = create_token(&state.jwt_secret, &user, "access")?;
    let refresh = create_token(&state.jwt_secret, &user, "refresh")?;

    Ok(Json(TokenResponse {
        access,
        refresh,
        user: user_profile(&user),
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<AccessTokenResponse>> {
    let claims = decode_refresh(&state, &req.refresh)?;

    let user = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthenticated)?;
    if !user.is_active {
        return Err(ApiError::Unauthenticated);
    }

    let access = create_token(&state.jwt_secret, &user, "access")?;
    Ok(Json(AccessTokenResponse { access }))
}

/// Blacklists the refresh token's jti. Idempotent; a missing or bogus token
/// still yields 200 so clients can always clear local state.
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<LogoutRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(token) = req.refresh.as_deref() {
        if let Ok(claims) = decode_refresh(&state, token) {
            state.db.revoke_jti(&claims.jti.to_string())?;
        }
    }
    Ok(Json(json!({ "message": "Logged out." })))
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyEmailRequest {
    pub token: Uuid,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> ApiResult<impl IntoResponse> {
    let token = req.token.to_string();
    let row = state
        .db
        .get_verification_token(&token)?
        .ok_or(ApiError::InvalidArgument("Invalid or expired token.".into()))?;
    if row.is_expired {
        return Err(ApiError::InvalidArgument("Invalid or expired token.".into()));
    }

    state.db.consume_verification_token(&token, &row.user_id)?;
    Ok(Json(json!({ "message": "Email verified." })))
}

/// Always answers 200 with the same message so the endpoint cannot be used
/// to probe which emails exist.
pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(user) = state.db.get_user_by_email(&req.email)? {
        let token = Uuid::new_v4().to_string();
        state.db.create_reset_token(&token, &user.id)?;
        info!("Password reset token for {}: {}", req.email, token);
    }
    Ok(Json(json!({
        "message": "If that email is registered, a reset link has been sent."
    })))
}

pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> ApiResult<impl IntoResponse> {
    validate_password(&req.new_password, &req.new_password_confirm)?;

    let token = req.token.to_string();
    let row = state
        .db
        .get_reset_token(&token)?
        .ok_or(ApiError::InvalidArgument("Invalid or expired token.".into()))?;
    if row.is_used || row.is_expired {
        return Err(ApiError::InvalidArgument("Invalid or expired token.".into()));
    }

    let new_hash = hash_password(&req.new_password)?;
    state.db.consume_reset_token(&token, &row.user_id, &new_hash)?;
    Ok(Json(json!({ "message": "Password updated." })))
}
