//! Retention cleanups
//!
//! Three sweeps, each driven daily by the scheduler: processed ratings past
//! the retention window, domain cache entries expired beyond the grace
//! period, and URL stats idle for over a month.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use trustline_core::config::RetentionSettings;
use trustline_db::{DbError, TrustDb};

pub struct Janitor {
    db: Arc<TrustDb>,
    retention: RetentionSettings,
}

impl Janitor {
    pub fn new(db: Arc<TrustDb>, retention: RetentionSettings) -> Self {
        Self { db, retention }
    }

    /// Delete processed ratings older than the retention window.
    pub fn prune_ratings(&self) -> Result<String, DbError> {
        let deleted = self
            .db
            .delete_processed_older_than(self.retention.rating_retention_days)?;
        info!("Rating janitor: {} processed ratings pruned", deleted);
        Ok(format!("{deleted} processed ratings pruned"))
    }

    /// Delete domain cache entries expired for longer than the grace period.
    pub fn prune_domain_cache(&self) -> Result<String, DbError> {
        let cutoff = Utc::now() - Duration::days(self.retention.expired_cache_grace_days);
        let deleted = self.db.delete_domains_expired_before(cutoff)?;
        info!("Domain cache janitor: {} expired entries pruned", deleted);
        Ok(format!("{deleted} expired cache entries pruned"))
    }

    /// Delete URL stats rows that have sat idle past the staleness window.
    pub fn sweep_stale_url_stats(&self) -> Result<String, DbError> {
        let cutoff = Utc::now() - Duration::days(self.retention.stale_stats_days);
        let deleted = self.db.delete_url_stats_idle_since(cutoff)?;
        info!("Stale stats sweep: {} rows removed", deleted);
        Ok(format!("{deleted} stale stats rows removed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustline_core::{ProcessingStatus, TrustConfig};
    use trustline_db::{DomainUpdate, Rating, UrlStats};

    fn setup() -> (Arc<TrustDb>, Janitor) {
        let db = Arc::new(TrustDb::in_memory().unwrap());
        let janitor = Janitor::new(db.clone(), TrustConfig::default().retention);
        (db, janitor)
    }

    #[test]
    fn prunes_only_old_processed_ratings() {
        let (db, janitor) = setup();
        db.append_rating(&Rating {
            fingerprint: "fp-old".to_string(),
            url: "https://example.com/old".to_string(),
            domain: "example.com".to_string(),
            user_id: "alice".to_string(),
            stars: 4,
            spam: false,
            misleading: false,
            scam: false,
            processed: false,
            created_at: Utc::now() - Duration::days(8),
        })
        .unwrap();
        db.mark_processed(&["fp-old".to_string()]).unwrap();

        assert_eq!(janitor.prune_ratings().unwrap(), "1 processed ratings pruned");
    }

    #[test]
    fn prunes_cache_entries_past_grace() {
        let (db, janitor) = setup();
        // Expired three days ago: past the one-day grace period
        db.upsert_domain_safe(
            &DomainUpdate {
                domain: "gone.example".to_string(),
                ..Default::default()
            },
            -3,
        )
        .unwrap();
        // Expired just now: inside the grace period, kept for fallback reads
        db.upsert_domain_safe(
            &DomainUpdate {
                domain: "fresh-expired.example".to_string(),
                ..Default::default()
            },
            0,
        )
        .unwrap();

        janitor.prune_domain_cache().unwrap();
        assert!(db.get_domain_entry("gone.example").unwrap().is_none());
        assert!(db.get_domain_entry("fresh-expired.example").unwrap().is_some());
    }

    #[test]
    fn sweeps_idle_stats() {
        let (db, janitor) = setup();
        db.upsert_url_stats(&UrlStats {
            fingerprint: "fp-idle".to_string(),
            domain: None,
            content_type: "general".to_string(),
            rating_count: 0,
            avg_rating: 0.0,
            spam_count: 0,
            misleading_count: 0,
            scam_count: 0,
            community_score: 50.0,
            domain_score: 50.0,
            final_score: 50.0,
            processing_status: ProcessingStatus::CommunityOnly,
            domain_analysis_processed: false,
            last_updated: Utc::now() - Duration::days(45),
        })
        .unwrap();

        assert_eq!(
            janitor.sweep_stale_url_stats().unwrap(),
            "1 stale stats rows removed"
        );
        assert!(db.get_url_stats("fp-idle").unwrap().is_none());
    }
}
