//! In-process sliding window log.
//!
//! Each window record is a sorted deque of request timestamps in
//! milliseconds. The read-count-append sequence for a key runs while holding
//! that key's map shard lock, so concurrent callers on one key see a
//! consistent count. No lock is ever held across an await point.

use super::{WindowOutcome, WindowRequest};
use crate::error::AdmissionError;
use dashmap::DashMap;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct LocalWindows {
    records: DashMap<String, VecDeque<u64>>,
}

impl LocalWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one request to the record for `request.key`.
    pub fn record(&self, request: &WindowRequest<'_>) -> Result<WindowOutcome, AdmissionError> {
        let window_start = request.window_start_ms();
        let mut record = self.records.entry(request.key.to_string()).or_default();

        while record.front().is_some_and(|&ts| ts < window_start) {
            record.pop_front();
        }

        let current = record.len();
        if current > request.limit as usize {
            return Err(AdmissionError::CorruptWindow {
                key: request.key.to_string(),
                len: current,
                limit: request.limit,
            });
        }

        if current >= request.limit as usize {
            return Ok(WindowOutcome {
                allowed: false,
                count: current as u64,
            });
        }

        // Keep the deque sorted if the wall clock stepped backwards.
        let at = record.partition_point(|&ts| ts <= request.now_ms);
        record.insert(at, request.now_ms);

        Ok(WindowOutcome {
            allowed: true,
            count: current as u64 + 1,
        })
    }

    /// Drop records whose entries have all left the window. Returns how many
    /// records were removed.
    pub fn sweep(&self, now_ms: u64, window_ms: u64) -> usize {
        let window_start = now_ms.saturating_sub(window_ms);
        let before = self.records.len();
        self.records
            .retain(|_, record| record.back().is_some_and(|&ts| ts >= window_start));
        before.saturating_sub(self.records.len())
    }

    /// Entries currently held for `key`, expired ones included.
    pub fn len_of(&self, key: &str) -> usize {
        self.records.get(key).map(|r| r.len()).unwrap_or(0)
    }

    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub(crate) fn overwrite(&self, key: &str, timestamps: impl IntoIterator<Item = u64>) {
        self.records
            .insert(key.to_string(), timestamps.into_iter().collect());
    }
}
