use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

/// Request-level failure taxonomy. Validation failures and missing ids are
/// local to the request; store failures propagate untouched — no retries,
/// no rollback of already-applied reconciliation steps.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            ApiError::BadRequest(reason) => {
                debug!(reason = %reason, "rejected request");
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            ApiError::Store(err) => {
                error!(err = %err, "store operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        (status, Json(json!({ "message": message, "data": null }))).into_response()
    }
}
