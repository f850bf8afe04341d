use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use reqwest::StatusCode;
use sqlx::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Initialization error: {0}")]
    Init(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            AppError::RateLimited => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, "Rate limited").into_response()
            }
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response(),
            AppError::Init(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: Error) -> Self {
        AppError::Db(value)
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

/// The four ways an outbound price request can fail, per the provider's
/// HTTP contract. Distinct from `AppError` because the backfill and
/// refresh loops branch on these, not on HTTP status codes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("throttled by price provider")]
    Throttled,
    #[error("transient error: {0}")]
    Transient(String),
    #[error("ticker not found")]
    NotFound,
    #[error("bad data: {0}")]
    BadData(String),
}

impl From<FetchError> for AppError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Throttled => AppError::RateLimited,
            FetchError::NotFound => AppError::NotFound("ticker not found at provider".into()),
            FetchError::Transient(msg) | FetchError::BadData(msg) => AppError::External(msg),
        }
    }
}
