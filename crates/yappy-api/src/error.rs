use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for every handler. Internal store failures are logged in
/// full and reach the caller as a generic 500; nothing is retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Unavailable(&'static str),
    #[error("Passcode not configured")]
    NotConfigured,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, (*msg).to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, (*msg).to_string()),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, (*msg).to_string()),
            ApiError::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Passcode not configured".to_string(),
            ),
            ApiError::Store(e) => {
                error!("Store error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("Message"), StatusCode::NOT_FOUND),
            (ApiError::Unauthorized("no"), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("no"), StatusCode::FORBIDDEN),
            (ApiError::Unavailable("later"), StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::NotConfigured, StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Store(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
