//! Rating aggregation
//!
//! Consumes unprocessed ratings fingerprint by fingerprint: recount from the
//! log, look up domain reputation, score, upsert URL stats. Only after the
//! whole tick are the consumed ratings marked processed, so a crashed tick
//! reprocesses rather than drops. The same per-fingerprint computation backs
//! the synchronous refresh on the submit path, which deliberately does not
//! mark anything processed.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use trustline_core::{score, ProcessingStatus, ScoreInputs};
use trustline_db::{DbError, TrustDb, UrlStats};

/// Trust-config key overriding the per-tick fingerprint cap.
pub const SOFT_CAP_KEY: &str = "aggregator_soft_cap";

/// Outcome of one aggregation tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub fingerprints_processed: u64,
    pub fingerprints_failed: u64,
    pub ratings_marked: u64,
    pub remaining_backlog: u64,
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fingerprints aggregated ({} failed), {} ratings marked, backlog {}",
            self.fingerprints_processed,
            self.fingerprints_failed,
            self.ratings_marked,
            self.remaining_backlog
        )
    }
}

/// The aggregation worker (and the submit path's synchronous refresher).
pub struct Aggregator {
    db: Arc<TrustDb>,
    default_soft_cap: u32,
    /// Serialises ticks: the scheduled job and the admin trigger never
    /// aggregate concurrently.
    tick_permit: Mutex<()>,
}

impl Aggregator {
    pub fn new(db: Arc<TrustDb>, default_soft_cap: u32) -> Self {
        Self {
            db,
            default_soft_cap,
            tick_permit: Mutex::new(()),
        }
    }

    /// One aggregation tick over at most the soft cap of fingerprints.
    /// Per-fingerprint failures are logged and skipped; their ratings stay
    /// unprocessed for the next tick.
    pub async fn run_tick(&self) -> Result<TickReport, DbError> {
        let _permit = self.tick_permit.lock().await;

        let soft_cap = self
            .db
            .get_config_u64(SOFT_CAP_KEY, self.default_soft_cap as u64)? as u32;
        let fingerprints = self.db.list_unprocessed_fingerprints(soft_cap)?;

        let mut report = TickReport::default();
        let mut done: Vec<String> = Vec::with_capacity(fingerprints.len());

        for fingerprint in fingerprints {
            match self.refresh_fingerprint(&fingerprint) {
                Ok(Some(_)) => done.push(fingerprint),
                Ok(None) => {
                    // No retained ratings; nothing to aggregate but the
                    // marker rows should not linger either.
                    done.push(fingerprint);
                }
                Err(e) => {
                    report.fingerprints_failed += 1;
                    error!("Aggregation failed for {}: {}", fingerprint, e);
                }
            }
        }

        report.fingerprints_processed = done.len() as u64;
        report.ratings_marked = self.db.mark_processed(&done)? as u64;
        report.remaining_backlog = self.db.count_unprocessed_fingerprints()?;

        info!("Aggregator tick: {}", report);
        Ok(report)
    }

    /// Recompute stats for a single fingerprint from the current rating log
    /// and upsert them. Returns the fresh stats, or `None` when the log holds
    /// no ratings for the fingerprint.
    pub fn refresh_fingerprint(&self, fingerprint: &str) -> Result<Option<UrlStats>, DbError> {
        let ratings = self.db.ratings_for_fingerprint(fingerprint)?;
        let Some(first) = ratings.first() else {
            return Ok(None);
        };
        let url = first.url.clone();
        let domain = first.domain.clone();

        let aggregates = self.db.rating_aggregates(fingerprint)?;
        let stats = self.compute_stats(fingerprint, &url, &domain, aggregates)?;
        self.db.upsert_url_stats(&stats)?;
        debug!(
            "Refreshed {}: final={} ({} ratings)",
            fingerprint, stats.final_score, stats.rating_count
        );
        Ok(Some(stats))
    }

    /// Score one URL against current domain state. Shared by the tick loop
    /// and the query path's baseline synthesis.
    pub fn compute_stats(
        &self,
        fingerprint: &str,
        url: &str,
        domain: &str,
        aggregates: trustline_core::RatingAggregates,
    ) -> Result<UrlStats, DbError> {
        let now = Utc::now();
        let entry = self.db.get_domain_entry(domain)?;

        let (signals, processing_status, analysis_processed) = match &entry {
            Some(e) if e.is_valid_at(now) => (
                Some(e.signals()),
                ProcessingStatus::EnhancedWithDomainAnalysis,
                true,
            ),
            Some(_) => (None, ProcessingStatus::CommunityWithBasicDomain, false),
            None if !domain.is_empty() => {
                (None, ProcessingStatus::CommunityWithBasicDomain, false)
            }
            None => (None, ProcessingStatus::CommunityOnly, false),
        };

        let blacklist = self.db.check_domain_blacklist(domain)?;
        let content_type = self.db.determine_content_type(url, domain)?;
        let modifier = self
            .db
            .lookup_modifier(domain, &content_type, aggregates.rating_count)?;

        let breakdown = score(ScoreInputs {
            ratings: aggregates,
            domain_signals: signals,
            blacklist,
            content_type,
            content_type_modifier: modifier,
        });

        Ok(UrlStats {
            fingerprint: fingerprint.to_string(),
            domain: (!domain.is_empty()).then(|| domain.to_string()),
            content_type: breakdown.content_type,
            rating_count: aggregates.rating_count,
            avg_rating: aggregates.avg_rating,
            spam_count: aggregates.spam_count,
            misleading_count: aggregates.misleading_count,
            scam_count: aggregates.scam_count,
            community_score: breakdown.community_score,
            domain_score: breakdown.domain_score,
            final_score: breakdown.final_score,
            processing_status,
            domain_analysis_processed: analysis_processed,
            last_updated: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustline_core::{HybridAnalysisStatus, SafeBrowsingStatus};
    use trustline_db::{BlacklistEntry, DomainUpdate, Rating};

    fn db() -> Arc<TrustDb> {
        Arc::new(TrustDb::in_memory().unwrap())
    }

    fn rating(fingerprint: &str, user: &str, stars: u8) -> Rating {
        Rating {
            fingerprint: fingerprint.to_string(),
            url: format!("https://example.com/{fingerprint}"),
            domain: "example.com".to_string(),
            user_id: user.to_string(),
            stars,
            spam: false,
            misleading: false,
            scam: false,
            processed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn tick_aggregates_and_marks_processed() {
        let db = db();
        db.append_rating(&rating("fp1", "alice", 5)).unwrap();
        db.append_rating(&rating("fp1", "bob", 5)).unwrap();
        db.append_rating(&rating("fp2", "alice", 1)).unwrap();

        let aggregator = Aggregator::new(db.clone(), 500);
        let report = aggregator.run_tick().await.unwrap();
        assert_eq!(report.fingerprints_processed, 2);
        assert_eq!(report.ratings_marked, 3);
        assert_eq!(report.remaining_backlog, 0);

        let stats = db.get_url_stats("fp1").unwrap().unwrap();
        assert_eq!(stats.rating_count, 2);
        assert_eq!(stats.avg_rating, 5.0);
        assert_eq!(
            stats.processing_status,
            ProcessingStatus::CommunityWithBasicDomain
        );
        // base 100, confidence 0.4: 100*0.4 + 50*0.6 = 70; fuse with 50
        assert_eq!(stats.community_score, 70.0);
        assert_eq!(stats.final_score, 62.0);

        // Nothing left to do: a second tick is a no-op
        let report = aggregator.run_tick().await.unwrap();
        assert_eq!(report.fingerprints_processed, 0);
        assert_eq!(report.ratings_marked, 0);
    }

    #[tokio::test]
    async fn tick_respects_soft_cap() {
        let db = db();
        for i in 0..5 {
            db.append_rating(&rating(&format!("fp{i}"), "alice", 3)).unwrap();
        }
        db.set_config_value(SOFT_CAP_KEY, "2").unwrap();

        let aggregator = Aggregator::new(db.clone(), 500);
        let report = aggregator.run_tick().await.unwrap();
        assert_eq!(report.fingerprints_processed, 2);
        assert_eq!(report.remaining_backlog, 3);
    }

    #[tokio::test]
    async fn valid_cache_entry_upgrades_processing_status() {
        let db = db();
        db.upsert_domain_safe(
            &DomainUpdate {
                domain: "example.com".to_string(),
                domain_age_days: Some(2000),
                ssl_valid: Some(true),
                http_status: Some(200),
                google_safe_browsing_status: Some(SafeBrowsingStatus::Clean),
                hybrid_analysis_status: Some(HybridAnalysisStatus::Clean),
                ..Default::default()
            },
            7,
        )
        .unwrap();
        for user in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"] {
            db.append_rating(&rating("fp1", user, 5)).unwrap();
        }

        let aggregator = Aggregator::new(db.clone(), 500);
        aggregator.run_tick().await.unwrap();

        let stats = db.get_url_stats("fp1").unwrap().unwrap();
        assert_eq!(
            stats.processing_status,
            ProcessingStatus::EnhancedWithDomainAnalysis
        );
        assert!(stats.domain_analysis_processed);
        assert_eq!(stats.domain_score, 65.0);
        assert_eq!(stats.community_score, 100.0);
        assert_eq!(stats.final_score, 86.0);
    }

    #[tokio::test]
    async fn expired_cache_entry_downgrades_to_basic_domain() {
        let db = db();
        db.upsert_domain_safe(
            &DomainUpdate {
                domain: "example.com".to_string(),
                ssl_valid: Some(false),
                ..Default::default()
            },
            -1,
        )
        .unwrap();
        db.append_rating(&rating("fp1", "alice", 3)).unwrap();

        let aggregator = Aggregator::new(db.clone(), 500);
        aggregator.run_tick().await.unwrap();

        let stats = db.get_url_stats("fp1").unwrap().unwrap();
        assert_eq!(
            stats.processing_status,
            ProcessingStatus::CommunityWithBasicDomain
        );
        // Expired signals are ignored: the domain component stays neutral
        assert_eq!(stats.domain_score, 50.0);
    }

    #[tokio::test]
    async fn blacklisted_domain_is_penalised() {
        let db = db();
        db.insert_blacklist_pattern(&BlacklistEntry {
            pattern: "example.com".to_string(),
            blacklist_type: "scam".to_string(),
            severity: 10,
            active: true,
            added_at: Utc::now(),
        })
        .unwrap();
        db.append_rating(&rating("fp1", "alice", 5)).unwrap();

        let aggregator = Aggregator::new(db.clone(), 500);
        aggregator.run_tick().await.unwrap();

        let stats = db.get_url_stats("fp1").unwrap().unwrap();
        assert_eq!(stats.domain_score, 0.0);
    }

    #[test]
    fn refresh_returns_none_for_unknown_fingerprint() {
        let aggregator = Aggregator::new(db(), 500);
        assert!(aggregator.refresh_fingerprint("missing").unwrap().is_none());
    }

    #[test]
    fn deleting_processed_ratings_leaves_stats_untouched() {
        let db = db();
        let mut old = rating("fp1", "alice", 5);
        old.created_at = Utc::now() - chrono::Duration::days(10);
        db.append_rating(&old).unwrap();

        let aggregator = Aggregator::new(db.clone(), 500);
        aggregator.refresh_fingerprint("fp1").unwrap().unwrap();
        db.mark_processed(&["fp1".to_string()]).unwrap();
        let before = db.get_url_stats("fp1").unwrap().unwrap();

        db.delete_processed_older_than(7).unwrap();
        let after = db.get_url_stats("fp1").unwrap().unwrap();
        assert_eq!(before.rating_count, after.rating_count);
        assert_eq!(before.final_score, after.final_score);
    }
}
