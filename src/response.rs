use crate::admission::BackendMode;
use crate::config::QuotaTable;
use crate::metrics::MetricsSnapshot;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AdmissionResponse {
    pub allowed: bool,
    pub quota_class: String,
    pub limit: u32,
    pub retry_after_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub backend_mode: BackendMode,
    pub shared_store: Option<String>,
    pub window_seconds: u64,
    pub quotas: QuotaTable,
    pub local_keys: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub backend_mode: BackendMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ReadyResponse {
    pub fn ready(backend_mode: BackendMode) -> Self {
        let note = match backend_mode {
            BackendMode::SharedStore => None,
            BackendMode::Local => Some("Running in local-only mode".to_string()),
        };

        Self {
            status: "ready".to_string(),
            backend_mode,
            note,
        }
    }
}
