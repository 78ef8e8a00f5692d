use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed input; nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("an account with this email already exists")]
    EmailTaken,

    /// Asset-service failure; the whole submission was aborted before any
    /// store write.
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(e) => {
                error!("Internal error: {e:#}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
