//! Generative enrichment backend
//!
//! Talks to a local Ollama instance to rewrite the rule-based recommendation
//! in richer operational language. The output is untrusted: every response
//! is parsed, normalized and validated before it may replace template text.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    format_percent, format_volume, EnrichedText, ForecastSummary, LanguageTag, RiskAssessment,
    RiskLevel, TemplateText, Trend,
};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::EnrichmentConfig;
use crate::error::{AppError, AppResult, EnrichmentError};

/// Shortest explanation accepted from the backend, in characters
pub const MIN_MOTIVE_CHARS: usize = 20;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_PAUSE: Duration = Duration::from_secs(1);

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Leading list markers on plain-text action lines ("-", "*", "•", "1.", "2)")
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•·]+\s*|\d+[.)]\s+)").unwrap());

/// Everything the backend needs to improve one recommendation
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub forecast: ForecastSummary,
    pub assessment: RiskAssessment,
    pub template: TemplateText,
    pub language: LanguageTag,
}

/// Availability report for the generative backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatus {
    pub available: bool,
    pub url: String,
    pub model: String,
    pub model_installed: bool,
    /// First few installed models
    pub models: Vec<String>,
    pub total_models: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait EnrichmentBackend: Send + Sync {
    /// Produce enriched text for one request within `timeout`, retries
    /// included.
    async fn enrich(
        &self,
        request: &EnrichmentRequest,
        timeout: Duration,
    ) -> Result<EnrichedText, EnrichmentError>;

    async fn health(&self) -> BackendStatus;
}

/// Ollama HTTP client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    max_retries: u32,
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// Outcome of a single call, before retry policy is applied
enum AttemptError {
    /// Connection refused or unreachable; retrying will not help
    Connect(String),
    Retryable(EnrichmentError),
}

impl OllamaClient {
    pub fn new(config: &EnrichmentConfig) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Configuration(format!("Enrichment client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            temperature: config.temperature,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
        })
    }

    async fn generate_once(&self, prompt: &str, timeout: Duration) -> Result<EnrichedText, AttemptError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
                top_p: self.top_p,
                num_predict: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AttemptError::Connect(format!("Cannot connect to {}: {}", self.base_url, e))
                } else if e.is_timeout() {
                    AttemptError::Retryable(EnrichmentError::Timeout)
                } else {
                    AttemptError::Retryable(EnrichmentError::Unavailable(format!(
                        "Request failed: {}",
                        e
                    )))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Retryable(EnrichmentError::Unavailable(format!(
                "Backend returned {}: {}",
                status, body
            ))));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptError::Retryable(EnrichmentError::Timeout)
            } else {
                AttemptError::Retryable(EnrichmentError::Malformed(format!(
                    "Invalid generate envelope: {}",
                    e
                )))
            }
        })?;

        tracing::debug!(
            preview = %body.response.chars().take(200).collect::<String>(),
            "Backend response received"
        );

        parse_enrichment(&body.response).map_err(AttemptError::Retryable)
    }
}

#[async_trait]
impl EnrichmentBackend for OllamaClient {
    async fn enrich(
        &self,
        request: &EnrichmentRequest,
        timeout: Duration,
    ) -> Result<EnrichedText, EnrichmentError> {
        let prompt = build_prompt(request);
        let deadline = Instant::now() + timeout;
        let mut remaining = self.max_retries;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(EnrichmentError::Timeout);
            }
            let attempt_timeout = left / (remaining + 1);

            match self.generate_once(&prompt, attempt_timeout).await {
                Ok(text) => return Ok(text),
                Err(AttemptError::Connect(msg)) => {
                    tracing::error!(error = %msg, "Enrichment backend unreachable");
                    return Err(EnrichmentError::Unreachable(msg));
                }
                Err(AttemptError::Retryable(e))
                    if remaining > 0
                        && deadline.saturating_duration_since(Instant::now()) > RETRY_PAUSE =>
                {
                    tracing::warn!(error = %e, remaining, "Enrichment attempt failed, retrying");
                    remaining -= 1;
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(AttemptError::Retryable(e)) => return Err(e),
            }
        }
    }

    async fn health(&self) -> BackendStatus {
        let mut status = BackendStatus {
            available: false,
            url: self.base_url.clone(),
            model: self.model.clone(),
            model_installed: false,
            models: Vec::new(),
            total_models: 0,
            error: None,
        };

        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                status.error = Some(format!("Backend returned {}", r.status()));
                return status;
            }
            Err(e) => {
                status.error = Some(e.to_string());
                return status;
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                status.available = true;
                status.model_installed = names.iter().any(|n| model_matches(n, &self.model));
                status.total_models = names.len();
                status.models = names.into_iter().take(5).collect();
            }
            Err(e) => status.error = Some(format!("Invalid tags response: {}", e)),
        }
        status
    }
}

/// "phi3.5" matches an installed "phi3.5:latest"
fn model_matches(installed: &str, configured: &str) -> bool {
    installed == configured || installed.split(':').next() == Some(configured)
}

fn urgency_context(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::High => "CRITICAL SITUATION - RISK OF OVERFLOW",
        RiskLevel::Moderate => "WATCH SITUATION - ELEVATED LEVELS",
        RiskLevel::Low => "NORMAL SITUATION - OPTIMAL LEVELS",
        RiskLevel::Drought => "CRITICAL SITUATION - RISK OF DROUGHT",
    }
}

fn trend_text(trend: Trend) -> &'static str {
    match trend {
        Trend::Rising => "Rising level",
        Trend::Stable => "Stable level",
        Trend::Falling => "Falling level",
    }
}

/// Build the structured prompt for one request
pub fn build_prompt(request: &EnrichmentRequest) -> String {
    let f = &request.forecast;
    let a = &request.assessment;

    let current = f
        .current_level
        .map(|l| format!("{} hm³", format_volume(l)))
        .unwrap_or_else(|| "unknown".to_string());
    let days_to_threshold = a
        .days_to_threshold
        .map(|d| format!("{} days", d))
        .unwrap_or_else(|| "not reached".to_string());
    let historical = f
        .historical
        .as_ref()
        .map(|h| {
            format!(
                "\n- Historical mean: {} hm³ (p10 {}, p90 {})",
                format_volume(h.mean),
                format_volume(h.p10),
                format_volume(h.p90)
            )
        })
        .unwrap_or_default();
    let draft_actions = request
        .template
        .actions
        .iter()
        .map(|a| format!("- {}", a))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an expert hydraulic engineer for a reservoir operations centre. \
Analyse the reservoir data and write professional operational recommendations.

{urgency}

RESERVOIR DATA:
- Reservoir: {reservoir}
- Current level: {current}
- Maximum capacity: {capacity} hm³

FORECAST ({days} days from {date}):
- Expected level: {mean} hm³ ({pct}% of capacity)
- Range: {min} - {max} hm³
- Confidence band: {lower} - {upper} hm³
- Trend: {trend}
- Days until threshold: {days_to_threshold}
- Risk level: {risk}{historical}

DRAFT RECOMMENDATION:
{motive}
{draft_actions}

TASK:
Improve the draft. Produce a JSON object with two fields:
1. \"motive\": a professional explanation of the risk level in 2-3 sentences. \
Mention the key figures and the trend.
2. \"actions\": an HTML unordered list (<ul><li>...</li></ul>) of 3-5 operational \
actions ordered from most to least urgent. Give numeric values where possible.

RULES:
- Write in language: {language}
- Do not use emojis, emoticons or decorative symbols
- Respond ONLY with valid JSON, no text before or after it

RESPONSE FORMAT:
{{\"motive\": \"...\", \"actions\": \"<ul><li>...</li><li>...</li></ul>\"}}",
        urgency = urgency_context(a.level),
        reservoir = f.key.reservoir_id,
        capacity = format_volume(f.capacity),
        days = f.key.horizon_days,
        date = f.key.reference_date,
        mean = format_volume(f.mean_level),
        pct = format_percent(a.percent_of_capacity),
        min = format_volume(f.min_level),
        max = format_volume(f.max_level),
        lower = format_volume(f.lower_bound),
        upper = format_volume(f.upper_bound),
        trend = trend_text(f.trend),
        risk = a.level,
        motive = request.template.motive,
        language = request.language.code(),
    )
}

/// Remove Markdown code fences around a JSON payload
fn strip_code_fences(raw: &str) -> &str {
    let raw = raw.trim();
    let inner = if let Some((_, rest)) = raw.split_once("```json") {
        rest
    } else if let Some((_, rest)) = raw.split_once("```") {
        rest
    } else {
        return raw;
    };
    inner.split("```").next().unwrap_or(inner).trim()
}

fn is_decorative(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF   // emoji, pictographs, symbols
            | 0x2600..=0x27BF // misc symbols, dingbats
            | 0x2B00..=0x2BFF // arrows and stars
            | 0x2190..=0x21FF // arrows
            | 0xFE00..=0xFE0F // variation selectors
            | 0x200D // zero width joiner
            | 0x20E3 // keycap
    )
}

/// Strip emoji and decorative symbols, collapsing whitespace
pub fn strip_decorative(text: &str) -> String {
    text.chars()
        .filter(|c| !is_decorative(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn clean_action(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, " ");
    let text = decode_entities(&text);
    let text = BULLET_RE.replace(&text, "");
    strip_decorative(&text)
}

/// Normalize the actions field into an ordered list
fn parse_actions(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) if LIST_ITEM_RE.is_match(s) => LIST_ITEM_RE
            .captures_iter(s)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Value::String(s) => s.lines().map(str::to_string).collect(),
        _ => Vec::new(),
    };

    raw.iter()
        .map(|a| clean_action(a))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Parse and validate a raw backend response
pub fn parse_enrichment(raw: &str) -> Result<EnrichedText, EnrichmentError> {
    let payload = strip_code_fences(raw);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| EnrichmentError::Malformed(format!("Invalid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| EnrichmentError::Malformed("Response is not a JSON object".to_string()))?;

    let motive = ["motive", "motivo"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))
        .map(strip_decorative)
        .unwrap_or_default();

    if motive.chars().count() < MIN_MOTIVE_CHARS {
        return Err(EnrichmentError::Malformed(format!(
            "Motive missing or shorter than {} characters",
            MIN_MOTIVE_CHARS
        )));
    }

    let actions = ["actions", "accion", "acciones"]
        .iter()
        .find_map(|k| object.get(*k))
        .map(parse_actions)
        .unwrap_or_default();

    if actions.is_empty() {
        return Err(EnrichmentError::Malformed("No actions in response".to_string()));
    }

    Ok(EnrichedText { motive, actions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_matches_tag_suffix() {
        assert!(model_matches("phi3.5:latest", "phi3.5"));
        assert!(model_matches("phi3.5", "phi3.5"));
        assert!(!model_matches("llama3:8b", "phi3.5"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_bullets_removed() {
        assert_eq!(clean_action("1. Open gate 2"), "Open gate 2");
        assert_eq!(clean_action("- Notify basin authority"), "Notify basin authority");
        assert_eq!(clean_action("• Reduce releases"), "Reduce releases");
    }
}
