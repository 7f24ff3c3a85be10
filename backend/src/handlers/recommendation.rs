//! HTTP handlers for recommendation endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use shared::{RecommendationKey, RecommendationView};
use validator::Validate;

use super::validation_error;
use crate::error::AppResult;
use crate::services::ReportBatch;
use crate::AppState;

/// Query parameters for a single recommendation
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RecommendationQuery {
    /// Defaults to today (UTC)
    pub reference_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 180, message = "Horizon must be between 1 and 180 days"))]
    pub horizon_days: Option<u32>,
}

/// Body of a force-refresh request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RefreshRequest {
    pub reference_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 180, message = "Horizon must be between 1 and 180 days"))]
    pub horizon_days: Option<u32>,
}

/// Body of a report batch request
#[derive(Debug, Deserialize, Validate)]
pub struct BatchRequest {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 reservoirs per batch"))]
    pub reservoir_ids: Vec<String>,
    pub reference_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 180, message = "Horizon must be between 1 and 180 days"))]
    pub horizon_days: Option<u32>,
}

fn resolve_key(
    state: &AppState,
    reservoir_id: String,
    reference_date: Option<NaiveDate>,
    horizon_days: Option<u32>,
) -> RecommendationKey {
    RecommendationKey::new(
        reservoir_id,
        reference_date.unwrap_or_else(|| Utc::now().date_naive()),
        horizon_days.unwrap_or(state.config.risk.default_horizon_days),
    )
}

/// Get the current recommendation for a reservoir
pub async fn get_recommendation(
    State(state): State<AppState>,
    Path(reservoir_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationView>> {
    query.validate().map_err(validation_error)?;
    let key = resolve_key(&state, reservoir_id, query.reference_date, query.horizon_days);

    let record = state.engine.get_recommendation(key).await?;
    Ok(Json(state.engine.view(&record)))
}

/// Discard the cached recommendation and regenerate it
pub async fn refresh_recommendation(
    State(state): State<AppState>,
    Path(reservoir_id): Path<String>,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<Json<RecommendationView>> {
    let Json(body) = body.unwrap_or_default();
    body.validate().map_err(validation_error)?;
    let key = resolve_key(&state, reservoir_id, body.reference_date, body.horizon_days);

    let record = state.engine.force_refresh(key).await?;
    Ok(Json(state.engine.view(&record)))
}

/// Recommendations for several reservoirs, most severe first
pub async fn get_report_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchRequest>,
) -> AppResult<Json<ReportBatch>> {
    input.validate().map_err(validation_error)?;

    let keys = input
        .reservoir_ids
        .into_iter()
        .map(|id| resolve_key(&state, id, input.reference_date, input.horizon_days))
        .collect();

    Ok(Json(state.engine.get_batch(keys).await))
}
