//! Common types used across the engine

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifies one recommendation instance.
///
/// Forecasts are immutable once generated for a key, so everything derived
/// from the forecast (risk level, template text) is stable per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecommendationKey {
    pub reservoir_id: String,
    pub reference_date: NaiveDate,
    pub horizon_days: u32,
}

impl RecommendationKey {
    pub fn new(reservoir_id: impl Into<String>, reference_date: NaiveDate, horizon_days: u32) -> Self {
        Self {
            reservoir_id: reservoir_id.into(),
            reference_date,
            horizon_days,
        }
    }
}

impl std::fmt::Display for RecommendationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}d",
            self.reservoir_id, self.reference_date, self.horizon_days
        )
    }
}

/// Language tag passed through to the enrichment prompt (e.g. "es", "en")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn code(&self) -> &str {
        &self.0
    }
}

impl Default for LanguageTag {
    fn default() -> Self {
        Self("es".to_string())
    }
}

/// Render a percentage with at most one decimal and no trailing zeros
/// (97 -> "97", 96.54 -> "96.5").
pub fn format_percent(value: Decimal) -> String {
    value.round_dp(1).normalize().to_string()
}

/// Render a volume in hm³ with two decimals
pub fn format_volume(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}
