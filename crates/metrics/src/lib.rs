//! Trustline Metrics - collection and monitoring

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MetricsCollector {
    ratings_submitted: AtomicU64,
    stats_queries: AtomicU64,
    domain_cache_hits: AtomicU64,
    domain_cache_misses: AtomicU64,
    analyses_run: AtomicU64,
    analyses_failed: AtomicU64,
    ratings_aggregated: AtomicU64,
    errors_by_code: DashMap<String, u64>,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub ratings_submitted: u64,
    pub stats_queries: u64,
    pub domain_cache_hits: u64,
    pub domain_cache_misses: u64,
    pub domain_cache_hit_rate: f64,
    pub analyses_run: u64,
    pub analyses_failed: u64,
    pub ratings_aggregated: u64,
    pub total_errors: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rating_submitted(&self) {
        self.ratings_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stats_query(&self) {
        self.stats_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_domain_cache_hit(&self) {
        self.domain_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_domain_cache_miss(&self) {
        self.domain_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis(&self, succeeded: bool) {
        self.analyses_run.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.analyses_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ratings_aggregated(&self, count: u64) {
        self.ratings_aggregated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self, code: &str) {
        *self.errors_by_code.entry(code.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.domain_cache_hits.load(Ordering::Relaxed);
        let misses = self.domain_cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        MetricsSnapshot {
            ratings_submitted: self.ratings_submitted.load(Ordering::Relaxed),
            stats_queries: self.stats_queries.load(Ordering::Relaxed),
            domain_cache_hits: hits,
            domain_cache_misses: misses,
            domain_cache_hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            analyses_run: self.analyses_run.load(Ordering::Relaxed),
            analyses_failed: self.analyses_failed.load(Ordering::Relaxed),
            ratings_aggregated: self.ratings_aggregated.load(Ordering::Relaxed),
            total_errors: self.errors_by_code.iter().map(|e| *e.value()).sum(),
        }
    }

    /// Error counters keyed by envelope code, in stable order.
    pub fn error_counts(&self) -> BTreeMap<String, u64> {
        self.errors_by_code
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_rating_submitted();
        metrics.record_stats_query();
        metrics.record_stats_query();
        metrics.record_ratings_aggregated(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ratings_submitted, 1);
        assert_eq!(snapshot.stats_queries, 2);
        assert_eq!(snapshot.ratings_aggregated, 5);
    }

    #[test]
    fn hit_rate_handles_empty_and_mixed() {
        let metrics = MetricsCollector::new();
        assert_eq!(metrics.snapshot().domain_cache_hit_rate, 0.0);

        metrics.record_domain_cache_hit();
        metrics.record_domain_cache_hit();
        metrics.record_domain_cache_miss();
        let snapshot = metrics.snapshot();
        assert!((snapshot.domain_cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn errors_group_by_code() {
        let metrics = MetricsCollector::new();
        metrics.record_error("ValidationError");
        metrics.record_error("ValidationError");
        metrics.record_error("Conflict");

        let counts = metrics.error_counts();
        assert_eq!(counts.get("ValidationError"), Some(&2));
        assert_eq!(counts.get("Conflict"), Some(&1));
        assert_eq!(metrics.snapshot().total_errors, 3);
    }
}
