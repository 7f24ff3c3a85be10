//! Bounded enrichment worker pool
//!
//! A fixed number of workers drain a bounded queue. Submission never waits:
//! when the queue is full the job is refused and the caller keeps serving
//! the template. Each job runs under a hard deadline.

use shared::{RecommendationKey, Source};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::cache::{CompletionOutcome, RecommendationCache};
use super::health::BackendHealth;
use super::stats::EnrichmentStats;
use crate::error::EnrichmentError;
use crate::external::{EnrichmentBackend, EnrichmentRequest};

/// One enrichment attempt, identified by the token that admitted it
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub key: RecommendationKey,
    pub token: Uuid,
    pub request: EnrichmentRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("enrichment queue is full")]
    Saturated,

    #[error("enrichment workers have stopped")]
    Closed,
}

/// Everything a worker needs to run a job and record its result
pub struct WorkerContext {
    pub backend: Arc<dyn EnrichmentBackend>,
    pub cache: Arc<RecommendationCache>,
    pub health: Arc<BackendHealth>,
    pub stats: Arc<EnrichmentStats>,
    pub timeout: Duration,
}

impl WorkerContext {
    async fn run(&self, job: EnrichmentJob) {
        let result = match tokio::time::timeout(
            self.timeout,
            self.backend.enrich(&job.request, self.timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Timeout),
        };

        // Any answer proves the backend is reachable; an error status alone
        // does not mark it down
        match &result {
            Ok(_) | Err(EnrichmentError::Malformed(_) | EnrichmentError::Unavailable(_)) => {
                self.health.mark_up()
            }
            Err(EnrichmentError::Unreachable(reason)) => self.health.mark_down(reason),
            Err(EnrichmentError::Timeout) => {}
        }
        self.stats.record_outcome(&result);

        complete(&self.cache, &self.stats, &job.key, job.token, result);
    }
}

/// Hand a result to the cache and log what happened to it
fn complete(
    cache: &RecommendationCache,
    stats: &EnrichmentStats,
    key: &RecommendationKey,
    token: Uuid,
    result: Result<shared::EnrichedText, EnrichmentError>,
) -> CompletionOutcome {
    let reason = result.as_ref().err().map(|e| e.to_string());
    let outcome = cache.complete_enrichment(key, token, result);
    match outcome {
        CompletionOutcome::Applied(Source::Ai) => {
            tracing::info!(key = %key, source = %Source::Ai, "Recommendation enriched");
        }
        CompletionOutcome::Applied(source) => {
            tracing::warn!(
                key = %key,
                source = %source,
                error = reason.as_deref().unwrap_or_default(),
                "Enrichment failed, keeping template"
            );
        }
        CompletionOutcome::Stale => {
            stats.record_stale();
            tracing::debug!(key = %key, "Stale enrichment result dropped");
        }
    }
    outcome
}

pub struct EnrichmentPool {
    sender: mpsc::Sender<EnrichmentJob>,
}

impl EnrichmentPool {
    /// Spawn `workers` tasks sharing a queue of `capacity` jobs
    pub fn start(
        workers: usize,
        capacity: usize,
        context: WorkerContext,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel::<EnrichmentJob>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let context = Arc::new(context);

        let handles = (0..workers.max(1))
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        tracing::debug!(worker = id, key = %job.key, "Enrichment started");
                        context.run(job).await;
                    }
                    tracing::debug!(worker = id, "Enrichment worker stopped");
                })
            })
            .collect();

        (Self { sender }, handles)
    }

    pub fn try_submit(&self, job: EnrichmentJob) -> Result<(), SubmitError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Saturated,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}
