use crate::admission::AdmissionController;
use crate::config::Config;
use crate::error::ConfigError;
use crate::handlers::{check_admission, health_check, readiness_check, status, AppState};
use crate::middleware::logging_middleware;
use crate::redis::RedisStore;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
    controller: Arc<AdmissionController>,
    cleanup_interval: Duration,
}

impl Server {
    pub async fn new(config: &Config) -> Result<Self, ConfigError> {
        let controller = Arc::new(build_controller(config).await?);

        Ok(Self {
            app: create_app(controller.clone()),
            bind_addr: config.bind_addr,
            controller,
            cleanup_interval: config.cleanup_interval(),
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Admission gate listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");
        tracing::info!("Readiness check available at /ready");

        let sweeper = tokio::spawn(sweep_local_windows(
            self.controller.clone(),
            self.cleanup_interval,
        ));

        let served = axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        served
    }
}

/// Build the controller and attach the shared store when one is configured.
pub async fn build_controller(config: &Config) -> Result<AdmissionController, ConfigError> {
    let limiter = config.limiter_config()?;
    let store_timeout = limiter.store_timeout;
    let controller = AdmissionController::new(limiter)?;

    let Some(url) = config.redis_url()? else {
        tracing::info!("No shared store configured, using in-process rate limiting");
        return Ok(controller);
    };

    let store = RedisStore::new(url, store_timeout)
        .map_err(|e| ConfigError::InvalidRedisUrl(e.to_string()))?;
    Ok(controller.with_store(Arc::new(store)).await)
}

pub fn create_app(controller: Arc<AdmissionController>) -> Router {
    Router::new()
        .route("/v1/admission/:quota_class", post(check_admission))
        .route("/v1/status", get(status))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(AppState::new(controller))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

async fn sweep_local_windows(controller: Arc<AdmissionController>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // the first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let removed = controller.sweep_expired();
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = controller.local_key_count(),
                "Swept idle rate limit windows"
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
