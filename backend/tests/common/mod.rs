//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reservoir_advisor_backend::{
    clock::{Clock, ManualClock},
    error::{AppError, AppResult, EnrichmentError},
    external::{BackendStatus, EnrichmentBackend, EnrichmentRequest, ForecastSource},
    services::{EngineDeps, EngineSettings, RecommendationOrchestrator, StaticThresholdStore},
};
use rust_decimal::Decimal;
use shared::{
    EnrichedText, ForecastPoint, ForecastSummary, RecommendationKey, RecommendationRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

pub fn key(reservoir_id: &str, horizon_days: u32) -> RecommendationKey {
    RecommendationKey::new(reservoir_id, reference_date(), horizon_days)
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()))
}

/// Build a forecast summary from whole-number daily levels
pub fn summary(
    key: &RecommendationKey,
    capacity: i64,
    levels: &[i64],
    current: Option<i64>,
) -> ForecastSummary {
    let points: Vec<ForecastPoint> = (0..key.horizon_days as usize)
        .map(|i| {
            let level = Decimal::from(levels[i.min(levels.len() - 1)]);
            ForecastPoint {
                date: key.reference_date + chrono::Duration::days(i as i64 + 1),
                predicted: level,
                lower: level - Decimal::ONE,
                upper: level + Decimal::ONE,
            }
        })
        .collect();
    ForecastSummary::from_series(
        key.clone(),
        Decimal::from(capacity),
        current.map(Decimal::from),
        &points,
        None,
    )
    .unwrap()
}

struct Series {
    capacity: i64,
    levels: Vec<i64>,
    current: Option<i64>,
}

/// Forecast source serving fixed series per reservoir
#[derive(Default)]
pub struct FakeForecasts {
    series: HashMap<String, Series>,
    unavailable: bool,
    /// Delay applied to the first call only
    first_delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeForecasts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reservoir_id: &str, capacity: i64, levels: &[i64], current: Option<i64>) -> Self {
        self.series.insert(
            reservoir_id.to_string(),
            Series {
                capacity,
                levels: levels.to_vec(),
                current,
            },
        );
        self
    }

    pub fn slow_first(mut self, delay: Duration) -> Self {
        self.first_delay = delay;
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ForecastSource for FakeForecasts {
    async fn get_forecast(&self, key: &RecommendationKey) -> AppResult<ForecastSummary> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 && !self.first_delay.is_zero() {
            tokio::time::sleep(self.first_delay).await;
        }
        if self.unavailable {
            return Err(AppError::ForecastUnavailable("connection refused".into()));
        }
        let series = self
            .series
            .get(&key.reservoir_id)
            .ok_or_else(|| AppError::ReservoirNotFound(key.reservoir_id.clone()))?;
        Ok(summary(key, series.capacity, &series.levels, series.current))
    }
}

#[derive(Debug, Clone)]
pub enum Mode {
    Succeed,
    Fail(EnrichmentError),
    /// Fails the first `n` calls, then succeeds
    FailFirst(usize, EnrichmentError),
    /// Never answers
    Hang,
}

/// Scripted generative backend
pub struct FakeBackend {
    mode: Mode,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn enriched_motive(reservoir_id: &str) -> String {
    format!("Enriched operational analysis for reservoir {}", reservoir_id)
}

#[async_trait]
impl EnrichmentBackend for FakeBackend {
    async fn enrich(
        &self,
        request: &EnrichmentRequest,
        _timeout: Duration,
    ) -> Result<EnrichedText, EnrichmentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.mode {
            Mode::Succeed => Ok(EnrichedText {
                motive: enriched_motive(&request.forecast.key.reservoir_id),
                actions: vec![
                    "Enriched first action".to_string(),
                    "Enriched second action".to_string(),
                ],
            }),
            Mode::Fail(e) => Err(e.clone()),
            Mode::FailFirst(n, e) if call < *n => Err(e.clone()),
            Mode::FailFirst(..) => Ok(EnrichedText {
                motive: enriched_motive(&request.forecast.key.reservoir_id),
                actions: vec![
                    "Enriched first action".to_string(),
                    "Enriched second action".to_string(),
                ],
            }),
            Mode::Hang => std::future::pending().await,
        }
    }

    async fn health(&self) -> BackendStatus {
        let available = match &self.mode {
            Mode::Fail(EnrichmentError::Unreachable(_)) => false,
            Mode::FailFirst(n, EnrichmentError::Unreachable(_)) => self.call_count() >= *n,
            _ => true,
        };
        BackendStatus {
            available,
            url: "http://fake".to_string(),
            model: "fake".to_string(),
            model_installed: available,
            models: vec!["fake".to_string()],
            total_models: 1,
            error: None,
        }
    }
}

pub struct Harness {
    pub engine: Arc<RecommendationOrchestrator>,
    pub forecasts: Arc<FakeForecasts>,
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(forecasts: FakeForecasts, backend: FakeBackend, settings: EngineSettings) -> Harness {
    let forecasts = Arc::new(forecasts);
    let backend = Arc::new(backend);
    let clock = manual_clock();
    let engine = RecommendationOrchestrator::start(
        EngineDeps {
            forecasts: forecasts.clone(),
            thresholds: Arc::new(StaticThresholdStore::default()),
            backend: backend.clone(),
            clock: clock.clone() as Arc<dyn Clock>,
        },
        settings,
    );
    Harness {
        engine: Arc::new(engine),
        forecasts,
        backend,
        clock,
    }
}

/// Poll the cache until the record for `key` can no longer change on its own
pub async fn wait_until_final(
    engine: &RecommendationOrchestrator,
    key: &RecommendationKey,
) -> RecommendationRecord {
    for _ in 0..5_000 {
        if let Some(record) = engine.cache().get(key) {
            if record.source.is_final() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("recommendation for {} never settled", key);
}
