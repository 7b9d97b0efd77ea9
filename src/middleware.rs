use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::admission::AdmissionController;
use crate::identity::{client_identity, HttpRequestSource};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let identity = request_identity(&request);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(
        target: "admission_gate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        identity = %identity,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        target: "admission_gate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

/// Identity the controller keys this request under.
pub fn request_identity(request: &Request) -> String {
    client_identity(&HttpRequestSource::new(request.headers(), peer_addr(request)))
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// A fixed quota class enforced in front of a router.
///
/// ```ignore
/// let guard = QuotaGuard::new(controller, "translation");
/// let router = translate_routes.layer(middleware::from_fn_with_state(guard, admission_guard));
/// ```
#[derive(Clone)]
pub struct QuotaGuard {
    controller: Arc<AdmissionController>,
    quota_class: Arc<str>,
}

impl QuotaGuard {
    pub fn new(controller: Arc<AdmissionController>, quota_class: impl Into<Arc<str>>) -> Self {
        Self {
            controller,
            quota_class: quota_class.into(),
        }
    }
}

/// Reject the request with 429 when the caller is over its quota.
pub async fn admission_guard(
    State(guard): State<QuotaGuard>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request_identity(&request);

    match guard.controller.enforce(&identity, &guard.quota_class).await {
        Ok(()) => next.run(request).await,
        Err(throttled) => throttled.into_response(),
    }
}
