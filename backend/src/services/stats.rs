//! Enrichment counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EnrichmentError;

#[derive(Debug, Default)]
pub struct EnrichmentStats {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed_timeout: AtomicU64,
    failed_malformed: AtomicU64,
    failed_unavailable: AtomicU64,
    failed_unreachable: AtomicU64,
    stale_dropped: AtomicU64,
    skipped_saturated: AtomicU64,
    skipped_backend_down: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed_timeout: u64,
    pub failed_malformed: u64,
    pub failed_unavailable: u64,
    pub failed_unreachable: u64,
    pub stale_dropped: u64,
    pub skipped_saturated: u64,
    pub skipped_backend_down: u64,
    /// Succeeded over finished attempts, as a percentage
    pub success_rate: f64,
}

impl EnrichmentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome<T>(&self, result: &Result<T, EnrichmentError>) {
        let counter = match result {
            Ok(_) => &self.succeeded,
            Err(EnrichmentError::Timeout) => &self.failed_timeout,
            Err(EnrichmentError::Malformed(_)) => &self.failed_malformed,
            Err(EnrichmentError::Unavailable(_)) => &self.failed_unavailable,
            Err(EnrichmentError::Unreachable(_)) => &self.failed_unreachable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_saturated(&self) {
        self.skipped_saturated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_down(&self) {
        self.skipped_backend_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let succeeded = load(&self.succeeded);
        let failed = load(&self.failed_timeout)
            + load(&self.failed_malformed)
            + load(&self.failed_unavailable)
            + load(&self.failed_unreachable);
        let finished = succeeded + failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            (succeeded as f64 / finished as f64 * 1000.0).round() / 10.0
        };

        StatsSnapshot {
            dispatched: load(&self.dispatched),
            succeeded,
            failed_timeout: load(&self.failed_timeout),
            failed_malformed: load(&self.failed_malformed),
            failed_unavailable: load(&self.failed_unavailable),
            failed_unreachable: load(&self.failed_unreachable),
            stale_dropped: load(&self.stale_dropped),
            skipped_saturated: load(&self.skipped_saturated),
            skipped_backend_down: load(&self.skipped_backend_down),
            success_rate,
        }
    }
}
