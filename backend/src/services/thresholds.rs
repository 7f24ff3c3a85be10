//! Per-reservoir risk band lookup

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::ReservoirThresholds;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

use crate::error::AppResult;

#[async_trait]
pub trait ThresholdStore: Send + Sync {
    async fn thresholds_for(&self, reservoir_id: &str) -> AppResult<ReservoirThresholds>;
}

#[derive(Debug, Clone, FromRow)]
struct ThresholdRow {
    high_pct: Decimal,
    moderate_pct: Decimal,
    drought_pct: Decimal,
}

/// Thresholds stored in the `reservoir_thresholds` table
#[derive(Clone)]
pub struct PgThresholdStore {
    db: PgPool,
    defaults: ReservoirThresholds,
}

impl PgThresholdStore {
    pub fn new(db: PgPool, defaults: ReservoirThresholds) -> Self {
        Self { db, defaults }
    }
}

#[async_trait]
impl ThresholdStore for PgThresholdStore {
    async fn thresholds_for(&self, reservoir_id: &str) -> AppResult<ReservoirThresholds> {
        let row = sqlx::query_as::<_, ThresholdRow>(
            r#"
            SELECT high_pct, moderate_pct, drought_pct
            FROM reservoir_thresholds
            WHERE reservoir_id = $1
            "#,
        )
        .bind(reservoir_id)
        .fetch_optional(&self.db)
        .await;

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(reservoir_id, error = %e, "Threshold lookup failed, using defaults");
                return Ok(self.defaults.clone());
            }
        };

        let Some(row) = row else {
            tracing::warn!(reservoir_id, "No stored thresholds, using defaults");
            return Ok(self.defaults.clone());
        };

        let thresholds = ReservoirThresholds {
            high_pct: row.high_pct,
            moderate_pct: row.moderate_pct,
            drought_pct: row.drought_pct,
        };
        if let Err(e) = thresholds.validate() {
            tracing::warn!(reservoir_id, error = e, "Stored thresholds invalid, using defaults");
            return Ok(self.defaults.clone());
        }
        Ok(thresholds)
    }
}

/// In-memory thresholds with optional per-reservoir overrides
#[derive(Debug, Clone, Default)]
pub struct StaticThresholdStore {
    defaults: ReservoirThresholds,
    overrides: HashMap<String, ReservoirThresholds>,
}

impl StaticThresholdStore {
    pub fn new(defaults: ReservoirThresholds) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, reservoir_id: impl Into<String>, thresholds: ReservoirThresholds) -> Self {
        self.overrides.insert(reservoir_id.into(), thresholds);
        self
    }
}

#[async_trait]
impl ThresholdStore for StaticThresholdStore {
    async fn thresholds_for(&self, reservoir_id: &str) -> AppResult<ReservoirThresholds> {
        Ok(self
            .overrides
            .get(reservoir_id)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone()))
    }
}
