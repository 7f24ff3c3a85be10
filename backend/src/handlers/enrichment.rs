//! HTTP handlers for enrichment diagnostics

use axum::{extract::State, Json};
use serde::Serialize;

use crate::external::BackendStatus;
use crate::services::StatsSnapshot;
use crate::AppState;

#[derive(Serialize)]
pub struct EnrichmentHealthResponse {
    pub enabled: bool,
    pub known_down: bool,
    pub backend: BackendStatus,
}

#[derive(Serialize)]
pub struct EnrichmentStatsResponse {
    pub enabled: bool,
    pub backend_known_down: bool,
    pub cache_entries: usize,
    pub enrichment: StatsSnapshot,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    pub removed: usize,
    pub remaining: usize,
}

/// Probe the generative backend now
pub async fn enrichment_health(State(state): State<AppState>) -> Json<EnrichmentHealthResponse> {
    let backend = state.engine.probe_backend().await;
    Json(EnrichmentHealthResponse {
        enabled: state.engine.enrichment_enabled(),
        known_down: state.engine.health().is_known_down(),
        backend,
    })
}

pub async fn enrichment_stats(State(state): State<AppState>) -> Json<EnrichmentStatsResponse> {
    Json(EnrichmentStatsResponse {
        enabled: state.engine.enrichment_enabled(),
        backend_known_down: state.engine.health().is_known_down(),
        cache_entries: state.engine.cache().len(),
        enrichment: state.engine.stats(),
    })
}

/// Remove expired recommendations from the cache
pub async fn purge_cache(State(state): State<AppState>) -> Json<PurgeResponse> {
    let removed = state.engine.purge_expired();
    tracing::info!(removed, "Cache purge requested");
    Json(PurgeResponse {
        removed,
        remaining: state.engine.cache().len(),
    })
}
