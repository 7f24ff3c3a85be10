//! Forecasting service client
//!
//! The forecasting model runs as its own service. Forecasts are immutable
//! once generated for a (reservoir, reference date, horizon) key.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{ForecastError, ForecastPoint, ForecastSummary, HistoricalStats, RecommendationKey};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Source of forecast summaries
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn get_forecast(&self, key: &RecommendationKey) -> AppResult<ForecastSummary>;
}

/// HTTP client for the forecasting service
#[derive(Clone)]
pub struct HttpForecastClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    capacity: f64,
    current_level: Option<f64>,
    points: Vec<PointResponse>,
    historical: Option<HistoricalResponse>,
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    date: NaiveDate,
    predicted: f64,
    lower: f64,
    upper: f64,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    mean: f64,
    p10: f64,
    p50: f64,
    p90: f64,
}

/// Volumes come over the wire as floats; keep three decimals (1000 m³)
fn volume(value: f64) -> AppResult<Decimal> {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(3))
        .ok_or_else(|| AppError::ForecastUnavailable(format!("Invalid volume value: {}", value)))
}

impl HttpForecastClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Forecast client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn into_summary(key: &RecommendationKey, body: ForecastResponse) -> AppResult<ForecastSummary> {
        let points = body
            .points
            .iter()
            .map(|p| {
                Ok(ForecastPoint {
                    date: p.date,
                    predicted: volume(p.predicted)?,
                    lower: volume(p.lower)?,
                    upper: volume(p.upper)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let historical = match body.historical {
            Some(h) => Some(HistoricalStats {
                mean: volume(h.mean)?,
                p10: volume(h.p10)?,
                p50: volume(h.p50)?,
                p90: volume(h.p90)?,
            }),
            None => None,
        };

        let current_level = body.current_level.map(volume).transpose()?;

        ForecastSummary::from_series(
            key.clone(),
            volume(body.capacity)?,
            current_level,
            &points,
            historical,
        )
        .map_err(|e| match e {
            ForecastError::EmptySeries | ForecastError::HorizonMismatch { .. } => {
                AppError::ForecastNotFound(format!("{}: {}", key, e))
            }
            ForecastError::InvalidCapacity | ForecastError::Overflow => {
                AppError::ForecastUnavailable(e.to_string())
            }
        })
    }
}

#[async_trait]
impl ForecastSource for HttpForecastClient {
    async fn get_forecast(&self, key: &RecommendationKey) -> AppResult<ForecastSummary> {
        let url = format!("{}/forecast/{}", self.base_url, key.reservoir_id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("reference_date", key.reference_date.to_string()),
                ("horizon_days", key.horizon_days.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ForecastUnavailable(format!("Request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::ReservoirNotFound(key.reservoir_id.clone()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ForecastUnavailable(format!(
                "Forecast service returned {}: {}",
                status, body
            )));
        }

        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| AppError::ForecastUnavailable(format!("Failed to parse forecast: {}", e)))?;

        Self::into_summary(key, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_rounding() {
        assert_eq!(volume(312.45678).unwrap().to_string(), "312.457");
        assert!(volume(f64::NAN).is_err());
    }

    #[test]
    fn test_short_series_is_not_found() {
        let key = RecommendationKey::new("E001", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 3);
        let body = ForecastResponse {
            capacity: 100.0,
            current_level: None,
            points: vec![PointResponse {
                date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                predicted: 50.0,
                lower: 45.0,
                upper: 55.0,
            }],
            historical: None,
        };
        let err = HttpForecastClient::into_summary(&key, body).unwrap_err();
        assert!(matches!(err, AppError::ForecastNotFound(_)));
    }

    #[test]
    fn test_out_of_range_volumes_are_unavailable() {
        let key = RecommendationKey::new("E001", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 1);
        let body = ForecastResponse {
            capacity: 0.001,
            current_level: None,
            points: vec![PointResponse {
                date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                predicted: 7e28,
                lower: 7e28,
                upper: 7e28,
            }],
            historical: None,
        };
        let err = HttpForecastClient::into_summary(&key, body).unwrap_err();
        assert!(matches!(err, AppError::ForecastUnavailable(_)));
    }
}
