//! Bearer token check for every route except health

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Invalid Authorization format (expected: Bearer <token>)")]
    InvalidFormat,
    #[error("Invalid token")]
    InvalidToken,
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::InvalidFormat)
}

pub async fn require_token(
    State(expected): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if bearer_token(request.headers())? != expected {
        debug!("rejected request to {}", request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        };
        (status, self.to_string()).into_response()
    }
}
