//! Recommendation orchestration
//!
//! Per key: MISS -> TEMPLATE_READY -> ENRICHING -> AI_READY, or
//! ENRICHING -> ENRICH_FAILED. A request always gets an answer from the
//! template path; enrichment happens behind it and upgrades the cached
//! record for later requests. Requests never wait on the generative backend.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    assess, template, validate_key, ForecastSummary, LanguageTag, RecommendationKey,
    RecommendationRecord, RecommendationView, RiskAssessment, Source, TemplateText,
};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use super::cache::RecommendationCache;
use super::health::BackendHealth;
use super::stats::{EnrichmentStats, StatsSnapshot};
use super::thresholds::ThresholdStore;
use super::worker::{EnrichmentJob, EnrichmentPool, WorkerContext};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::external::{BackendStatus, EnrichmentBackend, EnrichmentRequest, ForecastSource};

/// Collaborators injected into the orchestrator
pub struct EngineDeps {
    pub forecasts: Arc<dyn ForecastSource>,
    pub thresholds: Arc<dyn ThresholdStore>,
    pub backend: Arc<dyn EnrichmentBackend>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub enrichment_enabled: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Hard deadline for one enrichment job
    pub enrichment_timeout: Duration,
    pub ttl: chrono::Duration,
    pub language: LanguageTag,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enrichment_enabled: config.enrichment.enabled,
            workers: config.workers.count,
            queue_capacity: config.workers.queue_capacity,
            enrichment_timeout: config.enrichment.timeout(),
            ttl: config.cache.ttl(),
            language: LanguageTag::new(config.enrichment.language.clone()),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enrichment_enabled: true,
            workers: 2,
            queue_capacity: 32,
            enrichment_timeout: Duration::from_secs(30),
            ttl: chrono::Duration::hours(6),
            language: LanguageTag::default(),
        }
    }
}

/// A key that could not be resolved in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub reservoir_id: String,
    pub reference_date: NaiveDate,
    pub horizon_days: u32,
    pub code: String,
    pub message: String,
}

/// Recommendations for many keys, most severe first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBatch {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<RecommendationView>,
    pub failures: Vec<BatchFailure>,
}

pub struct RecommendationOrchestrator {
    forecasts: Arc<dyn ForecastSource>,
    thresholds: Arc<dyn ThresholdStore>,
    backend: Arc<dyn EnrichmentBackend>,
    cache: Arc<RecommendationCache>,
    health: Arc<BackendHealth>,
    stats: Arc<EnrichmentStats>,
    /// None when enrichment is disabled
    pool: Option<EnrichmentPool>,
    language: LanguageTag,
}

impl RecommendationOrchestrator {
    /// Build the engine and spawn its enrichment workers
    pub fn start(deps: EngineDeps, settings: EngineSettings) -> Self {
        let cache = Arc::new(RecommendationCache::new(deps.clock, settings.ttl));
        let health = Arc::new(BackendHealth::new());
        let stats = Arc::new(EnrichmentStats::new());

        let pool = settings.enrichment_enabled.then(|| {
            let (pool, _handles) = EnrichmentPool::start(
                settings.workers,
                settings.queue_capacity,
                WorkerContext {
                    backend: Arc::clone(&deps.backend),
                    cache: Arc::clone(&cache),
                    health: Arc::clone(&health),
                    stats: Arc::clone(&stats),
                    timeout: settings.enrichment_timeout,
                },
            );
            tracing::info!(
                workers = settings.workers,
                queue = settings.queue_capacity,
                "Enrichment workers started"
            );
            pool
        });

        Self {
            forecasts: deps.forecasts,
            thresholds: deps.thresholds,
            backend: deps.backend,
            cache,
            health,
            stats,
            pool,
            language: settings.language,
        }
    }

    pub fn cache(&self) -> &Arc<RecommendationCache> {
        &self.cache
    }

    pub fn health(&self) -> &Arc<BackendHealth> {
        &self.health
    }

    pub fn backend(&self) -> &Arc<dyn EnrichmentBackend> {
        &self.backend
    }

    pub fn enrichment_enabled(&self) -> bool {
        self.pool.is_some()
    }

    /// Client-facing view of a record
    pub fn view(&self, record: &RecommendationRecord) -> RecommendationView {
        record.view(self.enrichment_enabled())
    }

    /// Serve the recommendation for `key`, creating the template on a miss
    pub async fn get_recommendation(&self, key: RecommendationKey) -> AppResult<RecommendationRecord> {
        validate_key(&key).map_err(|(field, msg)| AppError::invalid(field, msg))?;

        if let Some(record) = self.cache.get(&key) {
            if record.source == Source::Template {
                self.schedule(&record);
                return Ok(self.cache.get(&key).unwrap_or(record));
            }
            return Ok(record);
        }

        self.create(&key).await
    }

    /// Discard whatever is cached for `key` and start over from the template
    pub async fn force_refresh(&self, key: RecommendationKey) -> AppResult<RecommendationRecord> {
        validate_key(&key).map_err(|(field, msg)| AppError::invalid(field, msg))?;

        if self.cache.invalidate(&key) {
            tracing::info!(key = %key, "Recommendation invalidated");
        }

        // A concurrent request may have recreated (or even enriched) the key
        // while the forecast was fetched; the refresh still wins
        let (forecast, assessment, text) = self.prepare(&key).await?;
        let ttl = self.cache.ttl();
        let record = self.cache.replace(&key, |now| {
            tracing::info!(
                key = %key,
                risk = %assessment.level,
                source = %Source::Template,
                "Template recommendation regenerated"
            );
            RecommendationRecord::template(forecast, assessment, text.motive, text.actions, now, ttl)
        });

        self.schedule(&record);
        Ok(record)
    }

    /// Resolve many keys for a report
    pub async fn get_batch(&self, keys: Vec<RecommendationKey>) -> ReportBatch {
        let mut items = Vec::with_capacity(keys.len());
        let mut failures = Vec::new();

        for key in keys {
            match self.get_recommendation(key.clone()).await {
                Ok(record) => items.push(self.view(&record)),
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "Batch entry failed");
                    failures.push(BatchFailure {
                        reservoir_id: key.reservoir_id,
                        reference_date: key.reference_date,
                        horizon_days: key.horizon_days,
                        code: e.code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        items.sort_by_key(|v| (Reverse(v.severity), v.reservoir_id.clone()));

        ReportBatch {
            generated_at: self.cache.now(),
            items,
            failures,
        }
    }

    /// Live probe of the generative backend
    pub async fn probe_backend(&self) -> BackendStatus {
        let status = self.backend.health().await;
        self.health.record_probe(status.clone());
        status
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// Fetch, classify and draft the template text for `key`
    async fn prepare(
        &self,
        key: &RecommendationKey,
    ) -> AppResult<(ForecastSummary, RiskAssessment, TemplateText)> {
        let forecast = self.forecasts.get_forecast(key).await?;
        let thresholds = self.thresholds.thresholds_for(&key.reservoir_id).await?;
        let assessment = assess(&forecast, &thresholds);
        let text = template::generate(assessment.level, &forecast);
        Ok((forecast, assessment, text))
    }

    async fn create(&self, key: &RecommendationKey) -> AppResult<RecommendationRecord> {
        let (forecast, assessment, text) = self.prepare(key).await?;
        let ttl = self.cache.ttl();

        let record = self.cache.get_or_create(key, |now| {
            tracing::info!(
                key = %key,
                risk = %assessment.level,
                source = %Source::Template,
                "Template recommendation created"
            );
            RecommendationRecord::template(forecast, assessment, text.motive, text.actions, now, ttl)
        });

        self.schedule(&record);
        Ok(record)
    }

    /// Start enrichment for a template record, if nothing else already has
    fn schedule(&self, record: &RecommendationRecord) {
        let Some(pool) = &self.pool else {
            return;
        };
        let key = &record.key;
        if record.source != Source::Template {
            return;
        }

        // The record stays `template` and is picked up again by the first
        // request after a probe finds the backend back
        if self.health.is_known_down() {
            self.stats.record_backend_down();
            tracing::debug!(key = %key, "Enrichment backend down, serving template");
            return;
        }

        let Some(token) = self.cache.try_begin_enrichment(key) else {
            return;
        };

        let job = EnrichmentJob {
            key: key.clone(),
            token,
            request: EnrichmentRequest {
                forecast: record.forecast.clone(),
                assessment: record.assessment.clone(),
                template: TemplateText {
                    motive: record.motive.clone(),
                    actions: record.actions.clone(),
                },
                language: self.language.clone(),
            },
        };

        match pool.try_submit(job) {
            Ok(()) => {
                self.stats.record_dispatched();
                tracing::debug!(key = %key, "Enrichment dispatched");
            }
            Err(e) => {
                self.cache.release_enrichment(key, token);
                self.stats.record_saturated();
                tracing::warn!(key = %key, error = %e, "Enrichment skipped, serving template");
            }
        }
    }
}
