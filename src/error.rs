use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Rejected configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be greater than zero")]
    ZeroWindow,
    #[error("window size {0:?} is outside the supported range of 1ms to 30 days")]
    WindowOutOfRange(Duration),
    #[error("quota table must contain a \"default\" entry")]
    MissingDefaultQuota,
    #[error("quota class '{0}' must allow at least one request")]
    ZeroLimit(String),
    #[error("invalid quota entry '{0}': expected <class>=<positive integer>")]
    InvalidQuotaEntry(String),
    #[error("invalid quota class name '{0}'")]
    InvalidQuotaClass(String),
    #[error("store timeout must be greater than zero")]
    ZeroStoreTimeout,
    #[error("invalid redis url: {0}")]
    InvalidRedisUrl(String),
}

/// Failure talking to the shared store. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connect(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),
    #[error("unexpected store reply: {0}")]
    Protocol(String),
}

/// Unexpected failure inside a check. Absorbed by failing open.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("window record '{key}' holds {len} entries, above its limit of {limit}")]
    CorruptWindow { key: String, len: usize, limit: u32 },
    #[error("admission check panicked: {0}")]
    Panicked(String),
}

/// Caller exceeded its quota. The only error that crosses the controller boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limit exceeded for '{quota_class}'. Try again in {retry_after_seconds} seconds.")]
pub struct Throttled {
    pub quota_class: String,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Throttled(#[from] Throttled),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
            retry_after_seconds: None,
        }
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::ValidationError(msg) => Self::new("validation_error", msg, 422),
            ApiError::Throttled(throttled) => Self {
                retry_after_seconds: Some(throttled.retry_after_seconds),
                ..Self::new("rate_limit_exceeded", &throttled.to_string(), 429)
            },
            ApiError::InternalServerError(msg) => Self::new("internal_error", msg, 500),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_api_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(body)).into_response();

        if let ApiError::Throttled(throttled) = &self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(throttled.retry_after_seconds),
            );
        }

        response
    }
}

impl IntoResponse for Throttled {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_maps_to_429_with_retry_hint() {
        let err = ApiError::from(Throttled {
            quota_class: "translation".to_string(),
            retry_after_seconds: 60,
        });
        let body = ErrorResponse::from_api_error(&err);
        assert_eq!(body.code, 429);
        assert_eq!(body.retry_after_seconds, Some(60));
        assert!(body.message.contains("60 seconds"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[test]
    fn test_validation_error_maps_to_422() {
        let response = ApiError::ValidationError("bad class".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
