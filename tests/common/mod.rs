#![allow(dead_code)]

use admission_gate::algorithms::{WindowOutcome, WindowRequest};
use admission_gate::{LimiterConfig, SharedStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn translation_limits() -> LimiterConfig {
    LimiterConfig::new(
        Duration::from_secs(60),
        [("translation", 10), ("auth", 5), ("default", 20)],
    )
}

/// Store double that behaves like a sorted set per key and counts calls.
#[derive(Default)]
pub struct CountingStore {
    failing: AtomicBool,
    pub pings: AtomicUsize,
    pub records: AtomicUsize,
    sets: Mutex<HashMap<String, Vec<u64>>>,
}

impl CountingStore {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every operation fails, including the startup probe.
    pub fn failing() -> Arc<Self> {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn fail_from_now(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn record_calls(&self) -> usize {
        self.records.load(Ordering::SeqCst)
    }

    pub fn entries(&self, key: &str) -> usize {
        self.sets.lock().unwrap().get(key).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl SharedStore for CountingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connect("connection refused".into()));
        }
        Ok(())
    }

    async fn record(&self, request: &WindowRequest<'_>) -> Result<WindowOutcome, StoreError> {
        self.records.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connect("connection reset by peer".into()));
        }

        tokio::task::yield_now().await;

        let mut sets = self.sets.lock().unwrap();
        let set = sets.entry(request.key.to_string()).or_default();
        let window_start = request.window_start_ms();
        set.retain(|&ts| ts >= window_start);
        if set.len() >= request.limit as usize {
            return Ok(WindowOutcome {
                allowed: false,
                count: set.len() as u64,
            });
        }
        set.push(request.now_ms);
        Ok(WindowOutcome {
            allowed: true,
            count: set.len() as u64,
        })
    }

    fn describe(&self) -> String {
        "counting-store".to_string()
    }
}
