//! Route definitions for the reservoir recommendation engine

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/recommendations", recommendation_routes())
        .nest("/enrichment", enrichment_routes())
}

/// Recommendation routes
fn recommendation_routes() -> Router<AppState> {
    Router::new()
        .route("/batch", post(handlers::get_report_batch))
        .route(
            "/:reservoir_id",
            get(handlers::get_recommendation).post(handlers::refresh_recommendation),
        )
}

/// Enrichment diagnostics routes
fn enrichment_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::enrichment_health))
        .route("/stats", get(handlers::enrichment_stats))
        .route("/cache/purge", post(handlers::purge_cache))
}
