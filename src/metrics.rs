use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub allowed: u64,
    pub denied: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub allowed: u64,
    pub denied: u64,
    pub fail_open: u64,
    pub store_fallbacks: u64,
    pub store_recoveries: u64,
    pub classes: BTreeMap<String, ClassMetrics>,
}

/// Decision counters for one admission controller.
///
/// Per-class counts are keyed by the effective quota class, so unknown class
/// names from callers all land under `default`.
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
    allowed: AtomicU64,
    denied: AtomicU64,
    fail_open: AtomicU64,
    store_fallbacks: AtomicU64,
    store_recoveries: AtomicU64,
    classes: DashMap<String, ClassMetrics>,
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, quota_class: &str, allowed: bool) {
        let counter = if allowed { &self.allowed } else { &self.denied };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut class = self.classes.entry(quota_class.to_string()).or_default();
        if allowed {
            class.allowed += 1;
        } else {
            class.denied += 1;
        }
    }

    pub fn record_fail_open(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
        self.fail_open.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.store_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.store_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            fail_open: self.fail_open.load(Ordering::Relaxed),
            store_fallbacks: self.store_fallbacks.load(Ordering::Relaxed),
            store_recoveries: self.store_recoveries.load(Ordering::Relaxed),
            classes: self
                .classes
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_aggregates_decisions() {
        let metrics = AdmissionMetrics::new();
        metrics.record_decision("translation", true);
        metrics.record_decision("translation", false);
        metrics.record_decision("default", true);
        metrics.record_fail_open();
        metrics.record_fallback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.allowed, 3);
        assert_eq!(snapshot.denied, 1);
        assert_eq!(snapshot.fail_open, 1);
        assert_eq!(snapshot.store_fallbacks, 1);
        assert_eq!(
            snapshot.classes["translation"],
            ClassMetrics { allowed: 1, denied: 1 }
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"store_recoveries\":0"));
    }
}
