//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trustline_core::{DomainSignals, HybridAnalysisStatus, ProcessingStatus, SafeBrowsingStatus};

/// One submitted rating in the append-only log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub fingerprint: String,
    pub url: String,
    pub domain: String,
    pub user_id: String,
    pub stars: u8,
    pub spam: bool,
    pub misleading: bool,
    pub scam: bool,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregated per-URL state, keyed by fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlStats {
    pub fingerprint: String,
    pub domain: Option<String>,
    pub content_type: String,
    pub rating_count: u64,
    pub avg_rating: f64,
    pub spam_count: u64,
    pub misleading_count: u64,
    pub scam_count: u64,
    pub community_score: f64,
    pub domain_score: f64,
    pub final_score: f64,
    pub processing_status: ProcessingStatus,
    pub domain_analysis_processed: bool,
    pub last_updated: DateTime<Utc>,
}

/// Cached reputation signals for one domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCacheEntry {
    pub domain: String,
    pub domain_age_days: Option<i64>,
    pub ssl_valid: Option<bool>,
    pub http_status: Option<u16>,
    pub google_safe_browsing_status: Option<SafeBrowsingStatus>,
    pub hybrid_analysis_status: Option<HybridAnalysisStatus>,
    pub whois_data: Option<serde_json::Value>,
    pub threat_score: Option<f64>,
    pub last_checked: DateTime<Utc>,
    pub cache_expires_at: DateTime<Utc>,
}

impl DomainCacheEntry {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.cache_expires_at > now
    }

    /// Signal view consumed by the scorer.
    pub fn signals(&self) -> DomainSignals {
        DomainSignals {
            domain_age_days: self.domain_age_days,
            ssl_valid: self.ssl_valid,
            http_status: self.http_status,
            safe_browsing: self.google_safe_browsing_status,
            hybrid_analysis: self.hybrid_analysis_status,
        }
    }
}

/// Signal fields written by the domain analyser; the store stamps
/// `last_checked` and `cache_expires_at` itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainUpdate {
    pub domain: String,
    pub domain_age_days: Option<i64>,
    pub ssl_valid: Option<bool>,
    pub http_status: Option<u16>,
    pub google_safe_browsing_status: Option<SafeBrowsingStatus>,
    pub hybrid_analysis_status: Option<HybridAnalysisStatus>,
    pub whois_data: Option<serde_json::Value>,
    pub threat_score: Option<f64>,
}

/// Result of a cheap existence probe on the domain cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainCachePresence {
    pub exists: bool,
    pub valid: bool,
}

/// Blacklist pattern consulted by the scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub pattern: String,
    pub blacklist_type: String,
    pub severity: u8,
    pub active: bool,
    pub added_at: DateTime<Utc>,
}

/// Content-type rule before insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContentTypeRule {
    pub domain: String,
    pub content_type: String,
    pub url_pattern: Option<String>,
    pub trust_score_modifier: i32,
    pub min_ratings_required: u32,
    pub description: String,
}

/// Per-domain rating aggregates used by the rule learner
#[derive(Debug, Clone, Serialize)]
pub struct DomainRatingStats {
    pub domain: String,
    pub rating_count: u64,
    pub spam_count: u64,
    pub misleading_count: u64,
    pub scam_count: u64,
}

/// Store-level statistics for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub url_stats_rows: u64,
    pub domain_cache_rows: u64,
    pub domain_cache_valid: u64,
    pub blacklist_patterns: u64,
    pub active_content_type_rules: u64,
    pub total_ratings: u64,
    pub unprocessed_ratings: u64,
}
