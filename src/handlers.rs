use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::error::{ApiError, Throttled};
use crate::health::HealthChecker;
use crate::identity::{client_identity, HttpRequestSource};
use crate::response::{AdmissionResponse, ReadyResponse, StatusResponse};
use crate::validation::{QuotaClassPath, RequestValidator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AdmissionController>,
    pub health: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self {
            health: Arc::new(HealthChecker::new(controller.clone())),
            controller,
        }
    }
}

/// Admit or reject the caller for a quota class, recording the attempt
pub async fn check_admission(
    State(state): State<AppState>,
    Path(path): Path<QuotaClassPath>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let quota_class = RequestValidator::quota_class(path)?;
    let identity = client_identity(&HttpRequestSource::new(&headers, peer.map(|c| c.0)));

    let result = state.controller.check(&identity, &quota_class).await;
    let (_, limit) = state.controller.limit_for(&quota_class);

    if !result.allowed {
        return Err(ApiError::Throttled(Throttled {
            quota_class,
            retry_after_seconds: result
                .retry_after_seconds
                .unwrap_or_else(|| state.controller.config().retry_after_seconds()),
        }));
    }

    let mut response = Json(AdmissionResponse {
        allowed: true,
        quota_class,
        limit,
        retry_after_seconds: None,
    })
    .into_response();
    response
        .headers_mut()
        .insert("x-ratelimit-limit", HeaderValue::from(limit));

    Ok(response)
}

/// Backend mode, limits and decision counters
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let controller = &state.controller;
    let config = controller.config();

    Json(StatusResponse {
        backend_mode: controller.mode(),
        shared_store: controller.store_description(),
        window_seconds: config.window_size.as_secs(),
        quotas: config.quotas.clone(),
        local_keys: controller.local_key_count(),
        metrics: controller.metrics(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health().await)
}

/// Readiness check endpoint; the limiter serves in either backend mode
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ReadyResponse::ready(state.controller.mode()))
}
