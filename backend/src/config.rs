//! Configuration management for the reservoir recommendation engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with RSV_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::ReservoirThresholds;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Forecasting service configuration
    pub forecast: ForecastConfig,

    /// Generative backend configuration
    pub enrichment: EnrichmentConfig,

    /// Recommendation cache configuration
    pub cache: CacheConfig,

    /// Enrichment worker pool configuration
    pub workers: WorkerConfig,

    /// Default risk bands
    pub risk: RiskConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

impl ServerConfig {
    /// `host:port` to bind
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    /// Base URL of the forecasting service
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    /// When false, template recommendations are final
    pub enabled: bool,

    /// Ollama base URL
    pub url: String,

    /// Model name
    pub model: String,

    /// Budget for one enrichment job in seconds, retries included
    pub timeout_secs: u64,

    /// Retries on malformed output, error statuses or transient transport
    /// errors
    pub max_retries: u32,

    pub temperature: f32,

    pub top_p: f32,

    /// Output token limit
    pub max_output_tokens: u32,

    /// Language tag passed into the prompt
    pub language: String,

    /// Interval between backend health probes, in seconds
    pub health_interval_secs: u64,
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Record time-to-live in seconds
    pub ttl_secs: u64,

    /// Interval between expired-record sweeps, in seconds
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Number of enrichment workers
    pub count: usize,

    /// Jobs that may wait for a worker before new ones are skipped
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskConfig {
    pub high_pct: Decimal,
    pub moderate_pct: Decimal,
    pub drought_pct: Decimal,

    /// Horizon used when a request does not name one
    pub default_horizon_days: u32,
}

impl RiskConfig {
    pub fn thresholds(&self) -> ReservoirThresholds {
        ReservoirThresholds {
            high_pct: self.high_pct,
            moderate_pct: self.moderate_pct,
            drought_pct: self.drought_pct,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("RSV_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = Self::builder(&environment)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (RSV prefix)
            .add_source(
                Environment::with_prefix("RSV")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Builder pre-populated with code defaults
    fn builder(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("environment", environment)?
            .set_default("server.port", 8000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.url", "postgres://localhost/reservoirs")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("forecast.base_url", "http://localhost:8100")?
            .set_default("forecast.timeout_secs", 10)?
            .set_default("enrichment.enabled", true)?
            .set_default("enrichment.url", "http://localhost:11434")?
            .set_default("enrichment.model", "phi3.5")?
            .set_default("enrichment.timeout_secs", 30)?
            .set_default("enrichment.max_retries", 2)?
            .set_default("enrichment.temperature", 0.3)?
            .set_default("enrichment.top_p", 0.9)?
            .set_default("enrichment.max_output_tokens", 512)?
            .set_default("enrichment.language", "es")?
            .set_default("enrichment.health_interval_secs", 60)?
            .set_default("cache.ttl_secs", 6 * 3600)?
            .set_default("cache.sweep_interval_secs", 600)?
            .set_default("workers.count", 2)?
            .set_default("workers.queue_capacity", 32)?
            .set_default("risk.high_pct", "95")?
            .set_default("risk.moderate_pct", "80")?
            .set_default("risk.drought_pct", "30")?
            .set_default("risk.default_horizon_days", 7)
    }

    /// Configuration made of code defaults only
    pub fn defaults() -> Result<Self, ConfigError> {
        let config: Config = Self::builder("development")?.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.risk
            .thresholds()
            .validate()
            .map_err(|e| ConfigError::Message(format!("risk: {}", e)))?;
        shared::validate_horizon(self.risk.default_horizon_days)
            .map_err(|e| ConfigError::Message(format!("risk.default_horizon_days: {}", e)))?;
        if self.workers.count == 0 || self.workers.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "workers.count and workers.queue_capacity must be positive".into(),
            ));
        }
        if self.enrichment.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "enrichment.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::defaults().unwrap();
        assert_eq!(config.cache.ttl_secs, 21_600);
        assert_eq!(config.enrichment.timeout(), Duration::from_secs(30));
        assert_eq!(config.risk.thresholds(), ReservoirThresholds::default());
        assert_eq!(config.risk.default_horizon_days, 7);
        assert!(config.enrichment.enabled);
        assert_eq!(config.server.addr(), "0.0.0.0:8000");
    }
}
