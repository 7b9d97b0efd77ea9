mod common;

use admission_gate::clock::ManualClock;
use admission_gate::{AdmissionController, BackendMode};
use common::{translation_limits, CountingStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

async fn hammer(controller: Arc<AdmissionController>, calls: usize) -> (usize, usize) {
    let barrier = Arc::new(Barrier::new(calls));
    let mut handles = Vec::with_capacity(calls);

    for i in 0..calls {
        let controller = controller.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            // stagger start order across workers
            for _ in 0..(i % 7) {
                tokio::task::yield_now().await;
            }
            controller.check("clientA", "stress").await
        }));
    }

    let mut allowed = 0;
    let mut denied = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        if result.allowed {
            allowed += 1;
        } else {
            assert_eq!(result.retry_after_seconds, Some(60));
            denied += 1;
        }
    }
    (allowed, denied)
}

fn stress_limits() -> admission_gate::LimiterConfig {
    admission_gate::LimiterConfig::new(Duration::from_secs(60), [("stress", 10), ("default", 20)])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_calls_in_process() {
    for _ in 0..5 {
        let controller = Arc::new(AdmissionController::new(stress_limits()).unwrap());
        let (allowed, denied) = hammer(controller, 100).await;
        assert_eq!(allowed, 10);
        assert_eq!(denied, 90);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_calls_against_shared_store() {
    let store = CountingStore::healthy();
    let controller = Arc::new(
        AdmissionController::new(stress_limits())
            .unwrap()
            .with_store(store.clone())
            .await,
    );
    assert_eq!(controller.mode(), BackendMode::SharedStore);

    let (allowed, denied) = hammer(controller.clone(), 100).await;
    assert_eq!((allowed, denied), (10, 90));
    assert_eq!(store.record_calls(), 100);
    assert_eq!(store.entries("rate_limit:stress:clientA"), 10);
    assert_eq!(controller.local_key_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_failover_logs_one_transition() {
    let store = CountingStore::healthy();
    let controller = Arc::new(
        AdmissionController::new(stress_limits())
            .unwrap()
            .with_store(store.clone())
            .await,
    );
    store.fail_from_now();

    let (allowed, denied) = hammer(controller.clone(), 100).await;
    assert_eq!((allowed, denied), (10, 90));
    assert_eq!(controller.mode(), BackendMode::Local);
    assert_eq!(controller.metrics().store_fallbacks, 1);
    // in-flight calls may each have reached the store before the switch
    assert!(store.record_calls() >= 1);

    let before = store.record_calls();
    controller.check("clientB", "stress").await;
    assert_eq!(store.record_calls(), before);
}

#[tokio::test]
async fn test_always_failing_store_uses_local_decisions() {
    let clock = ManualClock::new(Duration::from_secs(1_000));
    let store = CountingStore::failing();
    let controller = AdmissionController::new(translation_limits())
        .unwrap()
        .with_clock(Arc::new(clock.clone()))
        .with_store(store.clone())
        .await;

    for n in 1..=7 {
        clock.advance(Duration::from_secs(1));
        let result = controller.check("clientA", "auth").await;
        assert_eq!(result.allowed, n <= 5, "call {}", n);
    }

    assert_eq!(controller.mode(), BackendMode::Local);
    assert_eq!(store.pings.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(store.record_calls(), 0);
}

#[tokio::test]
async fn test_store_failing_mid_flight_is_tried_once() {
    let clock = ManualClock::new(Duration::ZERO);
    let store = CountingStore::healthy();
    let controller = AdmissionController::new(translation_limits())
        .unwrap()
        .with_clock(Arc::new(clock.clone()))
        .with_store(store.clone())
        .await;

    for t in 0..3 {
        clock.set(Duration::from_secs(t));
        assert!(controller.check("clientA", "translation").await.allowed);
    }
    assert_eq!(store.record_calls(), 3);

    store.fail_from_now();
    for t in 3..13 {
        clock.set(Duration::from_secs(t));
        let result = controller.check("clientA", "translation").await;
        // local windows start empty after the switch
        assert!(result.allowed, "call at t={}", t);
    }
    clock.set(Duration::from_secs(13));
    assert!(!controller.check("clientA", "translation").await.allowed);

    assert_eq!(store.record_calls(), 4);
    assert_eq!(controller.mode(), BackendMode::Local);
}

#[tokio::test]
async fn test_instances_do_not_share_state() {
    let first = AdmissionController::new(translation_limits()).unwrap();
    let second = AdmissionController::new(translation_limits()).unwrap();

    for _ in 0..5 {
        assert!(first.check("clientA", "auth").await.allowed);
    }
    assert!(!first.check("clientA", "auth").await.allowed);
    assert!(second.check("clientA", "auth").await.allowed);
}
