//! Recommendation engine services

pub mod cache;
pub mod health;
pub mod orchestrator;
pub mod stats;
pub mod thresholds;
pub mod worker;

pub use cache::{spawn_sweeper, CompletionOutcome, RecommendationCache};
pub use health::{spawn_monitor, BackendHealth};
pub use orchestrator::{
    BatchFailure, EngineDeps, EngineSettings, RecommendationOrchestrator, ReportBatch,
};
pub use stats::{EnrichmentStats, StatsSnapshot};
pub use thresholds::{PgThresholdStore, StaticThresholdStore, ThresholdStore};
pub use worker::{EnrichmentJob, EnrichmentPool, SubmitError, WorkerContext};
