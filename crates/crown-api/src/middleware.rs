use axum::{
    extract::Request,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use crown_types::api::Claims;

use crate::error::ApiError;

pub fn jwt_secret() -> String {
    std::env::var("CROWN_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into())
}

fn decode_bearer(headers: &HeaderMap) -> Option<Claims> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?;
    let token = auth_header.strip_prefix("Bearer ")?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    // Refresh tokens are only good for the refresh endpoint
    if data.claims.token_type != "access" {
        return None;
    }
    Some(data.claims)
}

/// Extract and validate the JWT from the Authorization header, injecting
/// [`Claims`] for downstream handlers.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = decode_bearer(req.headers()).ok_or(ApiError::Unauthenticated)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Best-effort claims for public endpoints that personalize their response
/// (saved flags, owner visibility) when a valid token happens to be present.
pub fn optional_claims(headers: &HeaderMap) -> Option<Claims> {
    decode_bearer(headers)
}
