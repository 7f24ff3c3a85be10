//! Forecast data models
//!
//! A forecast arrives from the forecasting collaborator as a daily series
//! with confidence bounds and is condensed into a [`ForecastSummary`], the
//! immutable input to classification and text generation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::RecommendationKey;

/// Relative change (2%) under which a forecast is considered stable
const STABLE_BAND: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// One predicted day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// Predicted level in hm³
    pub predicted: Decimal,
    /// Lower confidence bound in hm³
    pub lower: Decimal,
    /// Upper confidence bound in hm³
    pub upper: Decimal,
}

/// Historical reference statistics for the same reservoir
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalStats {
    pub mean: Decimal,
    pub p10: Decimal,
    pub p50: Decimal,
    pub p90: Decimal,
}

/// Direction of the predicted level over the horizon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Stable,
    Falling,
}

impl Trend {
    /// Compare the final predicted level against a reference level
    pub fn between(reference: Decimal, last: Decimal) -> Self {
        let band = (reference * STABLE_BAND).abs();
        let stable = last
            .checked_sub(reference)
            .is_some_and(|diff| diff.abs() <= band);
        if stable {
            Trend::Stable
        } else if last > reference {
            Trend::Rising
        } else {
            Trend::Falling
        }
    }


    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Stable => "stable",
            Trend::Falling => "falling",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a forecast series cannot be summarized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForecastError {
    #[error("forecast series is empty")]
    EmptySeries,

    #[error("reservoir capacity must be positive")]
    InvalidCapacity,

    #[error("forecast has {actual} points but horizon is {expected} days")]
    HorizonMismatch { expected: u32, actual: usize },

    #[error("forecast volumes are out of range")]
    Overflow,
}

/// Condensed forecast statistics for one key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastSummary {
    pub key: RecommendationKey,
    /// Maximum storage of the reservoir in hm³
    pub capacity: Decimal,
    /// Last observed level, when the collaborator knows it
    pub current_level: Option<Decimal>,
    pub min_level: Decimal,
    pub max_level: Decimal,
    pub mean_level: Decimal,
    /// Lowest lower confidence bound over the horizon
    pub lower_bound: Decimal,
    /// Highest upper confidence bound over the horizon
    pub upper_bound: Decimal,
    pub historical: Option<HistoricalStats>,
    pub trend: Trend,
    /// Daily predicted levels, first day first
    pub daily_levels: Vec<Decimal>,
    /// Daily predicted levels as a percentage of capacity
    pub daily_percents: Vec<Decimal>,
    /// Mean predicted level as a percentage of capacity
    pub mean_percent: Decimal,
}

impl ForecastSummary {
    /// Summarize a daily forecast series.
    ///
    /// The series may be longer than the horizon (the collaborator sometimes
    /// returns its full model horizon); only the first `horizon_days` points
    /// are used. A shorter series is rejected.
    pub fn from_series(
        key: RecommendationKey,
        capacity: Decimal,
        current_level: Option<Decimal>,
        points: &[ForecastPoint],
        historical: Option<HistoricalStats>,
    ) -> Result<Self, ForecastError> {
        if capacity <= Decimal::ZERO {
            return Err(ForecastError::InvalidCapacity);
        }
        if points.is_empty() {
            return Err(ForecastError::EmptySeries);
        }
        let horizon = key.horizon_days as usize;
        if points.len() < horizon {
            return Err(ForecastError::HorizonMismatch {
                expected: key.horizon_days,
                actual: points.len(),
            });
        }
        let points = &points[..horizon.max(1)];

        let daily_levels: Vec<Decimal> = points.iter().map(|p| p.predicted).collect();
        let min_level = daily_levels.iter().copied().min().unwrap_or_default();
        let max_level = daily_levels.iter().copied().max().unwrap_or_default();
        let mean_level = daily_levels
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(*l))
            .and_then(|total| total.checked_div(Decimal::from(daily_levels.len())))
            .ok_or(ForecastError::Overflow)?;
        let daily_percents = daily_levels
            .iter()
            .map(|l| percent_of(*l, capacity))
            .collect::<Option<Vec<_>>>()
            .ok_or(ForecastError::Overflow)?;
        let mean_percent = percent_of(mean_level, capacity).ok_or(ForecastError::Overflow)?;

        let lower_bound = points.iter().map(|p| p.lower).min().unwrap_or(min_level);
        let upper_bound = points.iter().map(|p| p.upper).max().unwrap_or(max_level);

        let reference = current_level.unwrap_or(daily_levels[0]);
        let last = daily_levels[daily_levels.len() - 1];

        Ok(Self {
            key,
            capacity,
            current_level,
            min_level,
            max_level,
            mean_level,
            lower_bound,
            upper_bound,
            historical,
            trend: Trend::between(reference, last),
            daily_levels,
            daily_percents,
            mean_percent,
        })
    }

    /// Representative level used for classification: mean over the horizon
    pub fn representative_percent(&self) -> Decimal {
        self.mean_percent
    }
}

fn percent_of(level: Decimal, capacity: Decimal) -> Option<Decimal> {
    level.checked_div(capacity)?.checked_mul(Decimal::ONE_HUNDRED)
}
