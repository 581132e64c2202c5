use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::presentation::SinkError;
use crate::storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("uptime history unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Replies could not be delivered to Discord
    #[error("reply delivery failed: {0}")]
    Upstream(#[from] SinkError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl ApiError {
    fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let body = ErrorBody {
            code,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
