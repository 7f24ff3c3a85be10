//! Recommendation cache
//!
//! One record per key in a sharded concurrent map. Every state transition
//! for a key happens while holding that key's entry lock, so check-and-set
//! operations (gate, completion) are atomic per key and never block other
//! keys. Nothing here awaits while a lock is held.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared::{EnrichedText, RecommendationKey, RecommendationRecord, Source};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EnrichmentError;

/// Result of handing an enrichment result back to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The record now carries this source
    Applied(Source),
    /// The token no longer matches; the result was dropped
    Stale,
}

pub struct RecommendationCache {
    entries: DashMap<RecommendationKey, RecommendationRecord>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl RecommendationCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            ttl,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Snapshot of the fresh record for `key`
    pub fn get(&self, key: &RecommendationKey) -> Option<RecommendationRecord> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.clone())
    }

    /// Return the fresh record for `key`, inserting `create(now)` when the
    /// key is absent or its record has expired
    pub fn get_or_create<F>(&self, key: &RecommendationKey, create: F) -> RecommendationRecord
    where
        F: FnOnce(DateTime<Utc>) -> RecommendationRecord,
    {
        let now = self.clock.now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(create(now));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(create(now)).clone(),
        }
    }

    /// Install `create(now)` for `key`, discarding whatever was there. An
    /// attempt in flight for the old record completes as stale.
    pub fn replace<F>(&self, key: &RecommendationKey, create: F) -> RecommendationRecord
    where
        F: FnOnce(DateTime<Utc>) -> RecommendationRecord,
    {
        let record = create(self.clock.now());
        self.entries.insert(key.clone(), record.clone());
        record
    }

    /// Single-flight gate. Hands out a token only for a fresh template
    /// record with no attempt in flight, and marks it `enriching`.
    pub fn try_begin_enrichment(&self, key: &RecommendationKey) -> Option<Uuid> {
        let now = self.clock.now();
        let mut record = self.entries.get_mut(key)?;
        if record.is_expired(now)
            || record.generation_token.is_some()
            || record.source != Source::Template
        {
            return None;
        }
        let token = Uuid::new_v4();
        record.generation_token = Some(token);
        record.source = Source::Enriching;
        Some(token)
    }

    /// Apply an enrichment result if `token` is still the record's current
    /// attempt. Success swaps in the new text and restarts the TTL window;
    /// failure keeps the template text.
    pub fn complete_enrichment(
        &self,
        key: &RecommendationKey,
        token: Uuid,
        result: Result<EnrichedText, EnrichmentError>,
    ) -> CompletionOutcome {
        let Some(mut record) = self.entries.get_mut(key) else {
            return CompletionOutcome::Stale;
        };
        if record.generation_token != Some(token) {
            return CompletionOutcome::Stale;
        }

        record.generation_token = None;
        match result {
            Ok(text) => {
                record.motive = text.motive;
                record.actions = text.actions;
                record.source = Source::Ai;
                record.fallback_reason = None;
                record.expires_at = self.clock.now() + self.ttl;
            }
            Err(e) => {
                record.source = Source::AiFailedFallback;
                record.fallback_reason = Some(e.to_string());
            }
        }
        CompletionOutcome::Applied(record.source)
    }

    /// Return an `enriching` record to `template` when its job never ran
    pub fn release_enrichment(&self, key: &RecommendationKey, token: Uuid) -> bool {
        match self.entries.get_mut(key) {
            Some(mut record) if record.generation_token == Some(token) => {
                record.generation_token = None;
                record.source = Source::Template;
                true
            }
            _ => false,
        }
    }

    pub fn invalidate(&self, key: &RecommendationKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, record| {
            let keep = !record.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically purge expired records
pub fn spawn_sweeper(cache: Arc<RecommendationCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired();
            if removed > 0 {
                tracing::info!(removed, remaining = cache.len(), "Expired recommendations purged");
            }
        }
    })
}
