//! Time source for window calculations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time since the Unix epoch.
///
/// Timestamps written to the shared store must be comparable across
/// instances, so this is wall time rather than `Instant`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Clock that only moves when told to.
///
/// Part of the public API so hosts can drive a controller through recorded
/// traffic or capacity simulations with deterministic timestamps, via
/// [`AdmissionController::with_clock`](crate::AdmissionController::with_clock).
/// Clones share the same reading.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(as_millis(start))),
        }
    }

    pub fn set(&self, at: Duration) {
        self.millis.store(as_millis(at), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |ms| {
                Some(ms.saturating_add(as_millis(by)))
            })
            .ok();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualClock::new(Duration::from_secs(5));
        let handle = clock.clone();
        handle.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), Duration::from_millis(6500));

        clock.set(Duration::from_secs(61));
        assert_eq!(handle.now(), Duration::from_secs(61));
    }

    #[test]
    fn test_millis_saturate() {
        assert_eq!(as_millis(Duration::from_micros(1500)), 1);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);

        let clock = ManualClock::new(Duration::from_millis(u64::MAX - 1));
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_system_clock_is_past_epoch() {
        assert!(SystemClock.now() > Duration::from_secs(1_600_000_000));
    }
}
