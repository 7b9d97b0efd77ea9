//! Admission controller: sliding window log with shared-store failover.
//!
//! Every guarded call goes through [`AdmissionController::check`]. Decisions
//! are made against the shared store while it answers; the first failed store
//! operation switches the controller to its in-process windows for the rest of
//! the process, unless a re-probe interval is configured.

use crate::algorithms::{window_key, LocalWindows, WindowOutcome, WindowRequest};
use crate::clock::{as_millis, Clock, SystemClock};
use crate::config::{LimiterConfig, DEFAULT_QUOTA_CLASS};
use crate::error::{AdmissionError, ConfigError, StoreError, Throttled};
use crate::metrics::{AdmissionMetrics, MetricsSnapshot};
use crate::redis::SharedStore;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MODE_SHARED: u8 = 0;
const MODE_LOCAL: u8 = 1;

/// Which backend holds the window records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    SharedStore,
    Local,
}

/// Decision for one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionResult {
    pub allowed: bool,
    pub retry_after_seconds: Option<u64>,
}

impl AdmissionResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: None,
        }
    }

    pub fn denied(retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds: Some(retry_after_seconds),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_seconds.map(Duration::from_secs)
    }
}

pub struct AdmissionController {
    config: LimiterConfig,
    default_limit: u32,
    store: Option<Arc<dyn SharedStore>>,
    mode: AtomicU8,
    /// Wall time in ms of the last failover or failed re-probe.
    demoted_at_ms: AtomicU64,
    local: LocalWindows,
    clock: Arc<dyn Clock>,
    metrics: AdmissionMetrics,
}

impl AdmissionController {
    /// Create a controller using only in-process windows.
    pub fn new(config: LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let default_limit = config
            .quotas
            .get(DEFAULT_QUOTA_CLASS)
            .ok_or(ConfigError::MissingDefaultQuota)?;

        Ok(Self {
            config,
            default_limit,
            store: None,
            mode: AtomicU8::new(MODE_LOCAL),
            demoted_at_ms: AtomicU64::new(0),
            local: LocalWindows::new(),
            clock: Arc::new(SystemClock),
            metrics: AdmissionMetrics::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the shared store and probe it once to pick the starting mode.
    pub async fn with_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        let probe = time::timeout(self.config.store_timeout, store.ping())
            .await
            .unwrap_or(Err(StoreError::Timeout(self.config.store_timeout)));

        match probe {
            Ok(()) => {
                info!(store = %store.describe(), "Shared store connected, using shared rate limiting");
                self.mode = AtomicU8::new(MODE_SHARED);
            }
            Err(err) => {
                warn!(
                    store = %store.describe(),
                    error = %err,
                    "Shared store unavailable at startup, using in-process rate limiting"
                );
                self.mode = AtomicU8::new(MODE_LOCAL);
                self.demoted_at_ms = AtomicU64::new(self.now_ms());
            }
        }

        self.store = Some(store);
        self
    }

    /// Decide whether to admit a request and record it if admitted.
    ///
    /// Never fails: store trouble falls back to the local windows and any
    /// other internal failure admits the request.
    pub async fn check(&self, identity: &str, quota_class: &str) -> AdmissionResult {
        let evaluation = AssertUnwindSafe(self.evaluate(identity, quota_class))
            .catch_unwind()
            .await;

        let err = match evaluation {
            Ok(Ok(result)) => return result,
            Ok(Err(err)) => err,
            Err(panic) => AdmissionError::Panicked(panic_message(&*panic)),
        };

        error!(
            identity = %identity,
            quota_class = %quota_class,
            error = %err,
            "Admission check failed, allowing request"
        );
        self.metrics.record_fail_open();
        AdmissionResult::allowed()
    }

    /// Like [`check`](Self::check) but turns a denial into [`Throttled`].
    pub async fn enforce(&self, identity: &str, quota_class: &str) -> Result<(), Throttled> {
        let result = self.check(identity, quota_class).await;
        if result.allowed {
            return Ok(());
        }

        Err(Throttled {
            quota_class: quota_class.to_string(),
            retry_after_seconds: result
                .retry_after_seconds
                .unwrap_or_else(|| self.config.retry_after_seconds()),
        })
    }

    async fn evaluate(
        &self,
        identity: &str,
        quota_class: &str,
    ) -> Result<AdmissionResult, AdmissionError> {
        let (effective_class, limit) = self.limit_for(quota_class);
        let now_ms = self.now_ms();
        let key = window_key(quota_class, identity);
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());
        let request = WindowRequest {
            key: &key,
            now_ms,
            window_ms: self.config.window_ms(),
            limit,
            member: &member,
            ttl_secs: self.config.key_ttl().as_secs().max(1),
        };

        let outcome = match self.store_outcome(&request).await {
            Some(outcome) => outcome,
            None => self.local.record(&request)?,
        };

        debug!(
            identity = %identity,
            quota_class = %quota_class,
            count = outcome.count,
            limit,
            allowed = outcome.allowed,
            "Rate limit check"
        );
        self.metrics.record_decision(effective_class, outcome.allowed);

        if outcome.allowed {
            Ok(AdmissionResult::allowed())
        } else {
            warn!(identity = %identity, quota_class = %quota_class, "Rate limit exceeded");
            Ok(AdmissionResult::denied(self.config.retry_after_seconds()))
        }
    }

    /// Run the request against the shared store. `None` means the caller
    /// must use the local windows.
    async fn store_outcome(&self, request: &WindowRequest<'_>) -> Option<WindowOutcome> {
        let store = self.active_store(request.now_ms)?;

        let err = match time::timeout(self.config.store_timeout, store.record(request)).await {
            Ok(Ok(outcome)) => {
                self.promote(store.as_ref());
                return Some(outcome);
            }
            Ok(Err(err)) => err,
            Err(_) => StoreError::Timeout(self.config.store_timeout),
        };

        self.demote(request.now_ms, store.as_ref(), &err);
        None
    }

    fn active_store(&self, now_ms: u64) -> Option<&Arc<dyn SharedStore>> {
        let store = self.store.as_ref()?;
        if self.mode() == BackendMode::SharedStore {
            return Some(store);
        }

        let interval = as_millis(self.config.reprobe_interval?);
        let last = self.demoted_at_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(last) < interval {
            return None;
        }

        // one caller per interval retries the store
        self.demoted_at_ms
            .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        debug!(store = %store.describe(), "Re-probing shared store");
        Some(store)
    }

    fn promote(&self, store: &dyn SharedStore) {
        if self.mode.swap(MODE_SHARED, Ordering::SeqCst) == MODE_LOCAL {
            info!(store = %store.describe(), "Shared store reachable again, resuming shared rate limiting");
            self.metrics.record_recovery();
        }
    }

    fn demote(&self, now_ms: u64, store: &dyn SharedStore, err: &StoreError) {
        self.demoted_at_ms.store(now_ms, Ordering::SeqCst);
        if self.mode.swap(MODE_LOCAL, Ordering::SeqCst) == MODE_SHARED {
            warn!(
                store = %store.describe(),
                error = %err,
                "Shared store failed, falling back to in-process rate limiting"
            );
            self.metrics.record_fallback();
        } else {
            debug!(error = %err, "Shared store still unavailable");
        }
    }

    /// Ceiling for a quota class and the class it is accounted under.
    pub fn limit_for<'a>(&'a self, quota_class: &'a str) -> (&'a str, u32) {
        match self.config.quotas.get(quota_class) {
            Some(limit) => (quota_class, limit),
            None => (DEFAULT_QUOTA_CLASS, self.default_limit),
        }
    }

    pub fn mode(&self) -> BackendMode {
        match self.mode.load(Ordering::SeqCst) {
            MODE_SHARED => BackendMode::SharedStore,
            _ => BackendMode::Local,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_description(&self) -> Option<String> {
        self.store.as_ref().map(|s| s.describe())
    }

    /// Ping the shared store without touching the backend mode.
    pub async fn probe_store(&self) -> Option<Result<Duration, StoreError>> {
        let store = self.store.as_ref()?;
        let started = Instant::now();
        let probe = time::timeout(self.config.store_timeout, store.ping())
            .await
            .unwrap_or(Err(StoreError::Timeout(self.config.store_timeout)));
        Some(probe.map(|()| started.elapsed()))
    }

    /// Drop idle in-process window records. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.local.sweep(self.now_ms(), self.config.window_ms())
    }

    pub fn local_key_count(&self) -> usize {
        self.local.key_count()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn now_ms(&self) -> u64 {
        as_millis(self.clock.now())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
