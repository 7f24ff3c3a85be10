//! Recommendation cache tests
//!
//! Tests for per-key record state including:
//! - Idempotent get-or-create
//! - The single-flight enrichment gate
//! - Token-checked completion (stale results are dropped)
//! - TTL expiry, reset on success and purging

mod common;

use common::*;
use proptest::prelude::*;
use reservoir_advisor_backend::clock::Clock;
use reservoir_advisor_backend::error::EnrichmentError;
use reservoir_advisor_backend::services::{CompletionOutcome, RecommendationCache};
use shared::{
    assess, template, EnrichedText, RecommendationKey, RecommendationRecord,
    ReservoirThresholds, Source,
};
use std::sync::Arc;

fn cache_with_clock() -> (RecommendationCache, Arc<reservoir_advisor_backend::clock::ManualClock>) {
    let clock = manual_clock();
    let cache = RecommendationCache::new(clock.clone() as Arc<dyn Clock>, chrono::Duration::hours(6));
    (cache, clock)
}

fn template_record(key: &RecommendationKey, level: i64, now: chrono::DateTime<chrono::Utc>) -> RecommendationRecord {
    let forecast = summary(key, 100, &[level], None);
    let assessment = assess(&forecast, &ReservoirThresholds::default());
    let text = template::generate(assessment.level, &forecast);
    RecommendationRecord::template(
        forecast,
        assessment,
        text.motive,
        text.actions,
        now,
        chrono::Duration::hours(6),
    )
}

fn enriched() -> EnrichedText {
    EnrichedText {
        motive: "Storage is close to full and still rising over the week".to_string(),
        actions: vec!["Open spillway gates gradually".to_string()],
    }
}

// =============================================================================
// Get or create
// =============================================================================

mod get_or_create {
    use super::*;

    #[test]
    fn creates_once() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);

        let first = cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let second = cache.get_or_create(&k, |_| panic!("must not be called for a fresh record"));

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.motive, second.motive);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replaces_expired_record() {
        let (cache, clock) = cache_with_clock();
        let k = key("E001", 7);

        let first = cache.get_or_create(&k, |now| template_record(&k, 97, now));
        clock.advance(chrono::Duration::hours(7));
        assert!(cache.get(&k).is_none());

        let second = cache.get_or_create(&k, |now| template_record(&k, 97, now));
        assert!(second.created_at > first.created_at);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let (cache, clock) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 50, now));

        clock.advance(chrono::Duration::hours(6));
        assert!(cache.get(&k).is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get(&k).is_none());
    }
}

// =============================================================================
// Enrichment gate and completion
// =============================================================================

mod gate {
    use super::*;

    #[test]
    fn only_one_token_per_attempt() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));

        let token = cache.try_begin_enrichment(&k).unwrap();
        assert!(cache.try_begin_enrichment(&k).is_none());
        assert_eq!(cache.get(&k).unwrap().source, Source::Enriching);
        assert_eq!(cache.get(&k).unwrap().generation_token, Some(token));
    }

    #[test]
    fn missing_key_has_no_gate() {
        let (cache, _) = cache_with_clock();
        assert!(cache.try_begin_enrichment(&key("E001", 7)).is_none());
    }

    #[test]
    fn success_replaces_text_and_resets_ttl() {
        let (cache, clock) = cache_with_clock();
        let k = key("E001", 7);
        let created = cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let token = cache.try_begin_enrichment(&k).unwrap();

        clock.advance(chrono::Duration::hours(2));
        let outcome = cache.complete_enrichment(&k, token, Ok(enriched()));
        assert_eq!(outcome, CompletionOutcome::Applied(Source::Ai));

        let record = cache.get(&k).unwrap();
        assert_eq!(record.source, Source::Ai);
        assert_eq!(record.motive, enriched().motive);
        assert_eq!(record.generation_token, None);
        assert_eq!(record.risk_level, created.risk_level);
        assert_eq!(record.expires_at, created.created_at + chrono::Duration::hours(8));
    }

    #[test]
    fn failure_keeps_template_text() {
        let (cache, _) = cache_with_clock();
        let k = key("E002", 7);
        let created = cache.get_or_create(&k, |now| template_record(&k, 25, now));
        let token = cache.try_begin_enrichment(&k).unwrap();

        let outcome = cache.complete_enrichment(&k, token, Err(EnrichmentError::Timeout));
        assert_eq!(outcome, CompletionOutcome::Applied(Source::AiFailedFallback));

        let record = cache.get(&k).unwrap();
        assert_eq!(record.motive, created.motive);
        assert_eq!(record.actions, created.actions);
        assert_eq!(record.expires_at, created.expires_at);
        assert!(record.fallback_reason.is_some());
    }

    #[test]
    fn final_records_are_not_gated_again() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));

        let token = cache.try_begin_enrichment(&k).unwrap();
        cache.complete_enrichment(&k, token, Ok(enriched()));
        assert!(cache.try_begin_enrichment(&k).is_none());

        let k2 = key("E002", 7);
        cache.get_or_create(&k2, |now| template_record(&k2, 25, now));
        let token = cache.try_begin_enrichment(&k2).unwrap();
        cache.complete_enrichment(&k2, token, Err(EnrichmentError::Malformed("x".into())));
        assert!(cache.try_begin_enrichment(&k2).is_none());
    }

    #[test]
    fn superseded_token_is_stale() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let old = cache.try_begin_enrichment(&k).unwrap();

        assert!(cache.invalidate(&k));
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let new = cache.try_begin_enrichment(&k).unwrap();

        assert_eq!(
            cache.complete_enrichment(&k, old, Ok(enriched())),
            CompletionOutcome::Stale
        );
        assert_eq!(cache.get(&k).unwrap().source, Source::Enriching);

        assert_eq!(
            cache.complete_enrichment(&k, new, Ok(enriched())),
            CompletionOutcome::Applied(Source::Ai)
        );
    }

    #[test]
    fn completion_after_invalidate_is_stale() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let token = cache.try_begin_enrichment(&k).unwrap();
        cache.invalidate(&k);

        assert_eq!(
            cache.complete_enrichment(&k, token, Ok(enriched())),
            CompletionOutcome::Stale
        );
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn replace_discards_enriched_record() {
        let (cache, clock) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let token = cache.try_begin_enrichment(&k).unwrap();
        cache.complete_enrichment(&k, token, Ok(enriched()));

        clock.advance(chrono::Duration::minutes(5));
        let replaced = cache.replace(&k, |now| template_record(&k, 97, now));
        assert_eq!(replaced.source, Source::Template);
        assert_eq!(cache.get(&k).unwrap().created_at, replaced.created_at);
        assert!(cache.try_begin_enrichment(&k).is_some());
    }

    #[test]
    fn replace_makes_in_flight_token_stale() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let token = cache.try_begin_enrichment(&k).unwrap();

        cache.replace(&k, |now| template_record(&k, 97, now));
        assert_eq!(
            cache.complete_enrichment(&k, token, Ok(enriched())),
            CompletionOutcome::Stale
        );
        assert_eq!(cache.get(&k).unwrap().source, Source::Template);
    }

    #[test]
    fn release_returns_record_to_template() {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        cache.get_or_create(&k, |now| template_record(&k, 97, now));
        let token = cache.try_begin_enrichment(&k).unwrap();

        assert!(cache.release_enrichment(&k, token));
        let record = cache.get(&k).unwrap();
        assert_eq!(record.source, Source::Template);
        assert_eq!(record.generation_token, None);
        assert!(!cache.release_enrichment(&k, token));
        assert!(cache.try_begin_enrichment(&k).is_some());
    }
}

// =============================================================================
// Purging
// =============================================================================

mod purge {
    use super::*;

    #[test]
    fn purge_removes_only_expired() {
        let (cache, clock) = cache_with_clock();
        let old = key("E001", 7);
        cache.get_or_create(&old, |now| template_record(&old, 50, now));

        clock.advance(chrono::Duration::hours(4));
        let fresh = key("E002", 7);
        cache.get_or_create(&fresh, |now| template_record(&fresh, 50, now));

        clock.advance(chrono::Duration::hours(3));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&fresh).is_some());
    }
}

// =============================================================================
// Property: stale completions never change a record
// =============================================================================

proptest! {
    /// Property: whatever sequence of superseded attempts happens first, only
    /// the current token's result is applied
    #[test]
    fn prop_only_current_token_applies(superseded in 1usize..6, succeed in any::<bool>()) {
        let (cache, _) = cache_with_clock();
        let k = key("E001", 7);
        let mut stale = Vec::new();

        for _ in 0..superseded {
            cache.invalidate(&k);
            cache.get_or_create(&k, |now| template_record(&k, 97, now));
            stale.push(cache.try_begin_enrichment(&k).unwrap());
        }
        let current = stale.pop().unwrap();
        let before = cache.get(&k).unwrap();

        for token in stale {
            prop_assert_eq!(
                cache.complete_enrichment(&k, token, Ok(enriched())),
                CompletionOutcome::Stale
            );
        }
        let untouched = cache.get(&k).unwrap();
        prop_assert_eq!(&untouched.motive, &before.motive);
        prop_assert_eq!(untouched.source, Source::Enriching);

        let result = if succeed { Ok(enriched()) } else { Err(EnrichmentError::Timeout) };
        let expected = if succeed { Source::Ai } else { Source::AiFailedFallback };
        prop_assert_eq!(
            cache.complete_enrichment(&k, current, result),
            CompletionOutcome::Applied(expected)
        );
    }
}
