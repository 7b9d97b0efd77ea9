use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::admission::{AdmissionController, BackendMode};
use crate::clock::as_millis;

const STORE_UNAVAILABLE: &str = "unavailable";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub backend_mode: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub shared_store: ServiceStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

pub struct HealthChecker {
    controller: Arc<AdmissionController>,
    started: Instant,
}

impl HealthChecker {
    pub fn new(controller: Arc<AdmissionController>) -> Self {
        Self {
            controller,
            started: Instant::now(),
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mode = self.controller.mode();
        let store_status = self.check_store().await;

        // Local mode is only a degradation when a store was configured. A
        // store that stopped answering degrades even before any check fails
        // over.
        let store_down = store_status.status == STORE_UNAVAILABLE;
        let overall_status = match mode {
            _ if !self.controller.has_store() => "healthy",
            BackendMode::Local => "degraded",
            BackendMode::SharedStore if store_down => "degraded",
            BackendMode::SharedStore => "healthy",
        };

        HealthStatus {
            status: overall_status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            backend_mode: match mode {
                BackendMode::SharedStore => "shared_store".to_string(),
                BackendMode::Local => "local".to_string(),
            },
            dependencies: DependencyStatus {
                shared_store: store_status,
            },
        }
    }

    async fn check_store(&self) -> ServiceStatus {
        match self.controller.probe_store().await {
            None => ServiceStatus {
                status: "not_configured".to_string(),
                response_time_ms: 0,
                error: None,
            },
            Some(Ok(elapsed)) => ServiceStatus {
                status: "healthy".to_string(),
                response_time_ms: as_millis(elapsed),
                error: None,
            },
            Some(Err(err)) => ServiceStatus {
                status: STORE_UNAVAILABLE.to_string(),
                response_time_ms: 0,
                error: Some(err.to_string()),
            },
        }
    }
}
