//! Recommendation records and their provenance

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::forecast::ForecastSummary;
use super::risk::{RiskAssessment, RiskLevel};
use crate::types::RecommendationKey;

/// Seconds a client should wait before polling again for an upgrade
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Where the current text of a recommendation came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Rule-based draft, no enrichment attempted yet
    Template,
    /// Rule-based draft while an enrichment attempt is in flight
    Enriching,
    /// Text produced by the generative backend
    Ai,
    /// Enrichment failed; the template text is final
    AiFailedFallback,
}

impl Source {
    /// Whether the record can still change without a force-refresh
    pub fn is_final(&self) -> bool {
        matches!(self, Source::Ai | Source::AiFailedFallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Template => "template",
            Source::Enriching => "enriching",
            Source::Ai => "ai",
            Source::AiFailedFallback => "ai_failed_fallback",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated output of the generative backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedText {
    pub motive: String,
    pub actions: Vec<String>,
}

/// The cached unit: one recommendation for one key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub key: RecommendationKey,
    pub risk_level: RiskLevel,
    pub assessment: RiskAssessment,
    pub motive: String,
    /// Priority-ordered, most urgent first. Never empty.
    pub actions: Vec<String>,
    pub source: Source,
    /// Why enrichment failed, for `ai_failed_fallback` records
    pub fallback_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// In-flight enrichment attempt, if any
    pub generation_token: Option<Uuid>,
    pub forecast: ForecastSummary,
}

impl RecommendationRecord {
    /// Create a template-sourced record
    pub fn template(
        forecast: ForecastSummary,
        assessment: RiskAssessment,
        motive: String,
        actions: Vec<String>,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            key: forecast.key.clone(),
            risk_level: assessment.level,
            assessment,
            motive,
            actions,
            source: Source::Template,
            fallback_reason: None,
            created_at,
            expires_at: created_at + ttl,
            generation_token: None,
            forecast,
        }
    }

    /// A record is stale once `now` is past `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn actions_html(&self) -> String {
        actions_to_html(&self.actions)
    }

    /// Client-facing projection. `may_upgrade` is false when enrichment is
    /// disabled, in which case a template record is final.
    pub fn view(&self, may_upgrade: bool) -> RecommendationView {
        let pending = matches!(self.source, Source::Template | Source::Enriching);
        RecommendationView {
            reservoir_id: self.key.reservoir_id.clone(),
            reference_date: self.key.reference_date,
            horizon_days: self.key.horizon_days,
            risk_level: self.risk_level,
            severity: self.risk_level.severity_rank(),
            color_hex: self.risk_level.color_hex().to_string(),
            percent_of_capacity: self.assessment.percent_of_capacity,
            days_to_threshold: self.assessment.days_to_threshold,
            exceedance_probability: self.assessment.exceedance_probability,
            trend: self.forecast.trend.as_str().to_string(),
            motive: self.motive.clone(),
            actions: self.actions.clone(),
            actions_html: self.actions_html(),
            source: self.source,
            created_at: self.created_at,
            expires_at: self.expires_at,
            poll_after_secs: (pending && may_upgrade).then_some(POLL_INTERVAL_SECS),
        }
    }
}

/// Shape exposed to the API layer and the report assembler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationView {
    pub reservoir_id: String,
    pub reference_date: NaiveDate,
    pub horizon_days: u32,
    pub risk_level: RiskLevel,
    pub severity: u8,
    pub color_hex: String,
    pub percent_of_capacity: Decimal,
    pub days_to_threshold: Option<u32>,
    /// Probability (0 to 1) of crossing the critical threshold
    pub exceedance_probability: Decimal,
    pub trend: String,
    pub motive: String,
    pub actions: Vec<String>,
    pub actions_html: String,
    pub source: Source,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_after_secs: Option<u64>,
}

/// Render an action list as an HTML unordered list
pub fn actions_to_html(actions: &[String]) -> String {
    let mut html = String::from("<ul>");
    for action in actions {
        html.push_str("<li>");
        html.push_str(&escape_html(action));
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    html
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serde_names() {
        assert_eq!(serde_json::to_string(&Source::Template).unwrap(), "\"template\"");
        assert_eq!(serde_json::to_string(&Source::Enriching).unwrap(), "\"enriching\"");
        assert_eq!(serde_json::to_string(&Source::Ai).unwrap(), "\"ai\"");
        assert_eq!(
            serde_json::to_string(&Source::AiFailedFallback).unwrap(),
            "\"ai_failed_fallback\""
        );
    }

    #[test]
    fn test_final_sources() {
        assert!(!Source::Template.is_final());
        assert!(!Source::Enriching.is_final());
        assert!(Source::Ai.is_final());
        assert!(Source::AiFailedFallback.is_final());
    }

    #[test]
    fn test_actions_html_escapes_text() {
        let html = actions_to_html(&[
            "Release < 5 hm3".to_string(),
            "Notify R&D".to_string(),
        ]);
        assert_eq!(
            html,
            "<ul><li>Release &lt; 5 hm3</li><li>Notify R&amp;D</li></ul>"
        );
    }
}
