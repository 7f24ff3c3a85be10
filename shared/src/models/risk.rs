//! Risk classification for reservoir forecasts
//!
//! Risk is decided on the forecast's representative level (the mean
//! predicted level over the horizon) as a percentage of capacity. HIGH and
//! DROUGHT are both urgent but describe opposite physical conditions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::forecast::ForecastSummary;

/// Operational risk category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Near full storage
    High,
    Moderate,
    Low,
    /// Scarce storage
    Drought,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::High,
        RiskLevel::Moderate,
        RiskLevel::Low,
        RiskLevel::Drought,
    ];

    /// Display rank used to order reports, higher is more severe.
    /// Not used for classification.
    pub fn severity_rank(&self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Moderate => 2,
            RiskLevel::High => 3,
            RiskLevel::Drought => 4,
        }
    }

    pub fn color_hex(&self) -> &'static str {
        match self {
            RiskLevel::High => "#FF5722",
            RiskLevel::Moderate => "#FFC107",
            RiskLevel::Low => "#4CAF50",
            RiskLevel::Drought => "#795548",
        }
    }

    /// Whether the level calls for immediate operational attention
    pub fn is_urgent(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Drought)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "HIGH",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::Low => "LOW",
            RiskLevel::Drought => "DROUGHT",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-reservoir percentage-of-capacity bands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservoirThresholds {
    /// At or above: HIGH
    pub high_pct: Decimal,
    /// At or above (and below high): MODERATE
    pub moderate_pct: Decimal,
    /// Below: DROUGHT. At or above (and below moderate): LOW
    pub drought_pct: Decimal,
}

impl Default for ReservoirThresholds {
    fn default() -> Self {
        Self {
            high_pct: Decimal::from(95),
            moderate_pct: Decimal::from(80),
            drought_pct: Decimal::from(30),
        }
    }
}

impl ReservoirThresholds {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.drought_pct <= Decimal::ZERO {
            return Err("Drought threshold must be positive");
        }
        if self.drought_pct >= self.moderate_pct {
            return Err("Drought threshold must be below the moderate threshold");
        }
        if self.moderate_pct >= self.high_pct {
            return Err("Moderate threshold must be below the high threshold");
        }
        if self.high_pct > Decimal::ONE_HUNDRED {
            return Err("High threshold cannot exceed 100%");
        }
        Ok(())
    }

    /// Band for a percentage of capacity. Exact boundary values resolve to
    /// the band that starts there (95 -> HIGH, 80 -> MODERATE, 30 -> LOW).
    pub fn band_for(&self, percent: Decimal) -> RiskLevel {
        if percent >= self.high_pct {
            RiskLevel::High
        } else if percent >= self.moderate_pct {
            RiskLevel::Moderate
        } else if percent >= self.drought_pct {
            RiskLevel::Low
        } else {
            RiskLevel::Drought
        }
    }
}

/// Classification result with the supporting figures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Representative level as a percentage of capacity
    pub percent_of_capacity: Decimal,
    /// First forecast day (1-based) on which the governing threshold is
    /// reached; none for LOW or when the series never reaches it
    pub days_to_threshold: Option<u32>,
    /// Probability (0 to 1) that the forecast crosses the band's critical
    /// threshold. Zero for LOW.
    pub exceedance_probability: Decimal,
}

/// Classify a forecast. Pure and total.
pub fn classify(forecast: &ForecastSummary, thresholds: &ReservoirThresholds) -> RiskLevel {
    thresholds.band_for(forecast.representative_percent())
}

/// Classify a forecast and compute the supporting figures
pub fn assess(forecast: &ForecastSummary, thresholds: &ReservoirThresholds) -> RiskAssessment {
    let percent = forecast.representative_percent();
    let level = thresholds.band_for(percent);

    let daily_pct = &forecast.daily_percents;
    let peak = daily_pct.iter().copied().max().unwrap_or(percent);
    let trough = daily_pct.iter().copied().min().unwrap_or(percent);

    let first_day = |hit: &dyn Fn(Decimal) -> bool| {
        daily_pct
            .iter()
            .position(|p| hit(*p))
            .map(|i| i as u32 + 1)
    };

    let days_to_threshold = match level {
        RiskLevel::High => first_day(&|p| p >= thresholds.high_pct),
        RiskLevel::Moderate => first_day(&|p| p >= thresholds.moderate_pct),
        RiskLevel::Drought => first_day(&|p| p < thresholds.drought_pct),
        RiskLevel::Low => None,
    };

    // How far the peak (or trough) reaches past the threshold, relative to
    // the room left in that direction
    let exceedance_probability = match level {
        RiskLevel::High => ratio(
            peak.checked_sub(thresholds.high_pct),
            Decimal::ONE_HUNDRED - thresholds.high_pct,
        ),
        RiskLevel::Moderate => ratio(
            peak.checked_sub(thresholds.moderate_pct),
            thresholds.high_pct - thresholds.moderate_pct,
        ),
        RiskLevel::Drought => ratio(
            thresholds.drought_pct.checked_sub(trough),
            thresholds.drought_pct,
        ),
        RiskLevel::Low => Decimal::ZERO,
    };

    RiskAssessment {
        level,
        percent_of_capacity: percent.round_dp(2),
        days_to_threshold,
        exceedance_probability,
    }
}

/// `excess / room`, clamped to [0, 1]. No room left, or an excess too
/// large to represent, means certain.
fn ratio(excess: Option<Decimal>, room: Decimal) -> Decimal {
    let Some(excess) = excess else {
        return Decimal::ONE;
    };
    if room <= Decimal::ZERO {
        return Decimal::ONE;
    }
    excess
        .checked_div(room)
        .unwrap_or(Decimal::ONE)
        .clamp(Decimal::ZERO, Decimal::ONE)
        .round_dp(3)
}
