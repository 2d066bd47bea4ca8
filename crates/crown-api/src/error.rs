use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-boundary error taxonomy. Every variant maps to a stable machine
/// error kind plus a human message; store failures collapse into `Internal`
/// with a generic body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Authentication required.")]
    Unauthenticated,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0} not found.")]
    NotFound(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn denied() -> Self {
        Self::PermissionDenied("Access denied.".into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::PermissionDenied(_) => (StatusCode::FORBIDDEN, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Internal(e) => {
                // Log the actual error, return a generic message
                error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.".to_string(),
                )
            }
        };

        let body = json!({ "error": self.kind(), "message": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_argument_is_400() {
        let resp = ApiError::InvalidArgument("message is required.".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn denied_is_403() {
        let resp = ApiError::denied().into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn not_found_is_404() {
        let resp = ApiError::NotFound("Listing").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let resp = ApiError::Internal(anyhow::anyhow!("db exploded")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
