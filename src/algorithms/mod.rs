//! Sliding window log shared by the local and shared-store backends.

pub mod sliding_window;

use serde::Serialize;

pub use sliding_window::LocalWindows;

/// One admission attempt against a window record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest<'a> {
    /// `rate_limit:{quota_class}:{identity}`
    pub key: &'a str,
    pub now_ms: u64,
    pub window_ms: u64,
    pub limit: u32,
    /// Unique member so two requests in the same millisecond both count.
    pub member: &'a str,
    pub ttl_secs: u64,
}

impl WindowRequest<'_> {
    /// Entries strictly older than this have left the window.
    pub fn window_start_ms(&self) -> u64 {
        self.now_ms.saturating_sub(self.window_ms)
    }
}

/// Result of applying one request to a window record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowOutcome {
    pub allowed: bool,
    /// Entries in the window after this request was applied.
    pub count: u64,
}

/// Build the store key for a (quota class, identity) pair.
pub fn window_key(quota_class: &str, identity: &str) -> String {
    format!("rate_limit:{}:{}", quota_class, identity)
}
