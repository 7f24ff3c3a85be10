//! Generative backend availability tracking
//!
//! Workers mark the backend down when a call cannot connect at all; an error
//! status from a backend that answered does not count. The periodic probe
//! (and the health endpoint) set the state either way. While the backend is
//! known down no enrichment is dispatched and records keep their template.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::external::{BackendStatus, EnrichmentBackend};

#[derive(Debug, Default)]
pub struct BackendHealth {
    down: AtomicBool,
    last_status: Mutex<Option<BackendStatus>>,
}

impl BackendHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }

    pub fn mark_down(&self, reason: &str) {
        if !self.down.swap(true, Ordering::AcqRel) {
            tracing::warn!(error = reason, "Enrichment backend marked down");
        }
    }

    pub fn mark_up(&self) {
        if self.down.swap(false, Ordering::AcqRel) {
            tracing::info!("Enrichment backend available again");
        }
    }

    /// Record a probe result and update availability
    pub fn record_probe(&self, status: BackendStatus) {
        if status.available {
            self.mark_up();
        } else {
            self.mark_down(status.error.as_deref().unwrap_or("probe failed"));
        }
        *self.last_status.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
    }

    pub fn last_status(&self) -> Option<BackendStatus> {
        self.last_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Probe the backend every `every`, starting immediately
pub fn spawn_monitor(
    backend: Arc<dyn EnrichmentBackend>,
    health: Arc<BackendHealth>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let status = backend.health().await;
            tracing::debug!(available = status.available, "Enrichment backend probed");
            health.record_probe(status);
        }
    })
}
