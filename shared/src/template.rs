//! Rule-based recommendation text
//!
//! This is the guaranteed fallback: it is served while enrichment is pending
//! and kept when enrichment fails, so it must never fail and never touch
//! anything outside its arguments.

use serde::{Deserialize, Serialize};

use crate::models::{ForecastSummary, RiskLevel, Trend};
use crate::types::{format_percent, format_volume};

/// Motive and priority-ordered actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateText {
    pub motive: String,
    pub actions: Vec<String>,
}

/// Generate the rule-based recommendation for a risk level and forecast
pub fn generate(risk: RiskLevel, forecast: &ForecastSummary) -> TemplateText {
    let pct = format_percent(forecast.representative_percent());
    let mean = format_volume(forecast.mean_level);
    let min = format_volume(forecast.min_level);
    let max = format_volume(forecast.max_level);
    let capacity = format_volume(forecast.capacity);
    let days = forecast.key.horizon_days;
    let trend = trend_phrase(forecast.trend);

    match risk {
        RiskLevel::High => TemplateText {
            motive: format!(
                "The forecast level averages {pct}% of capacity ({mean} of {capacity} hm³) \
                 over the next {days} days, {trend}. Predicted levels range from {min} to \
                 {max} hm³, leaving little margin before full storage."
            ),
            actions: vec![
                "Monitor reservoir level and inflows at least hourly".to_string(),
                format!("Plan preventive releases to lower storage from the forecast {max} hm³ peak"),
                "Coordinate the release schedule with the basin authority and downstream users"
                    .to_string(),
                "Activate the flood emergency protocol and alert system".to_string(),
            ],
        },
        RiskLevel::Moderate => TemplateText {
            motive: format!(
                "The forecast level averages {pct}% of capacity ({mean} hm³) over the next \
                 {days} days, {trend}. Storage is elevated but below the high-risk band."
            ),
            actions: vec![
                "Increase level monitoring to at least twice daily".to_string(),
                "Evaluate gradual releases to preserve flood-control capacity".to_string(),
                format!("Review meteorological forecasts covering the next {days} days"),
            ],
        },
        RiskLevel::Low => TemplateText {
            motive: format!(
                "The forecast level holds at {pct}% of capacity ({mean} hm³) over the next \
                 {days} days, {trend}. This is within the optimal operating range."
            ),
            actions: vec![
                "Continue standard level monitoring".to_string(),
                "No special operational measures are required".to_string(),
            ],
        },
        RiskLevel::Drought => TemplateText {
            motive: format!(
                "The forecast level falls to {pct}% of capacity ({mean} hm³) over the next \
                 {days} days, {trend}. The lowest predicted level is {min} hm³, with a risk \
                 of insufficient supply."
            ),
            actions: vec![
                "Activate the water scarcity protocol".to_string(),
                "Implement usage restrictions and reduce non-essential releases".to_string(),
                "Evaluate alternative supply sources".to_string(),
                "Coordinate allocation priorities with the basin authority".to_string(),
            ],
        },
    }
}

fn trend_phrase(trend: Trend) -> &'static str {
    match trend {
        Trend::Rising => "trending rising",
        Trend::Stable => "trending stable",
        Trend::Falling => "trending declining",
    }
}
