//! Shared domain types used across the scoring pipeline

use serde::{Deserialize, Serialize};

/// Which inputs the latest aggregation had available for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Only community ratings were available.
    CommunityOnly,
    /// The domain was known but no valid cache entry existed.
    CommunityWithBasicDomain,
    /// A valid domain cache entry contributed reputation signals.
    EnhancedWithDomainAnalysis,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::CommunityOnly => "community_only",
            ProcessingStatus::CommunityWithBasicDomain => "community_with_basic_domain",
            ProcessingStatus::EnhancedWithDomainAnalysis => "enhanced_with_domain_analysis",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "community_only" => Some(ProcessingStatus::CommunityOnly),
            "community_with_basic_domain" => Some(ProcessingStatus::CommunityWithBasicDomain),
            "enhanced_with_domain_analysis" => Some(ProcessingStatus::EnhancedWithDomainAnalysis),
            _ => None,
        }
    }

    /// How a stored row is labelled for clients.
    pub fn data_source(&self) -> DataSource {
        match self {
            ProcessingStatus::EnhancedWithDomainAnalysis => DataSource::Enhanced,
            _ => DataSource::Community,
        }
    }
}

/// Provenance label attached to every stats response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Baseline,
    Domain,
    Community,
    Enhanced,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Baseline => "baseline",
            DataSource::Domain => "domain",
            DataSource::Community => "community",
            DataSource::Enhanced => "enhanced",
        }
    }
}

/// Domain cache state as seen by a stats query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Valid,
    Expired,
    Missing,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Valid => "valid",
            CacheStatus::Expired => "expired",
            CacheStatus::Missing => "missing",
        }
    }
}

/// Google Safe Browsing verdict for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeBrowsingStatus {
    Clean,
    Malware,
    Phishing,
    Unwanted,
}

impl SafeBrowsingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafeBrowsingStatus::Clean => "clean",
            SafeBrowsingStatus::Malware => "malware",
            SafeBrowsingStatus::Phishing => "phishing",
            SafeBrowsingStatus::Unwanted => "unwanted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(SafeBrowsingStatus::Clean),
            "malware" => Some(SafeBrowsingStatus::Malware),
            "phishing" => Some(SafeBrowsingStatus::Phishing),
            "unwanted" => Some(SafeBrowsingStatus::Unwanted),
            _ => None,
        }
    }
}

/// Hybrid Analysis sandbox verdict for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridAnalysisStatus {
    Clean,
    Suspicious,
    Malicious,
}

impl HybridAnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HybridAnalysisStatus::Clean => "clean",
            HybridAnalysisStatus::Suspicious => "suspicious",
            HybridAnalysisStatus::Malicious => "malicious",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(HybridAnalysisStatus::Clean),
            "suspicious" => Some(HybridAnalysisStatus::Suspicious),
            "malicious" => Some(HybridAnalysisStatus::Malicious),
            _ => None,
        }
    }
}

/// Aggregated community ratings for one fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingAggregates {
    pub rating_count: u64,
    pub avg_rating: f64,
    pub spam_count: u64,
    pub misleading_count: u64,
    pub scam_count: u64,
}

/// Reputation signals from a valid domain cache entry.
///
/// Every field is optional: an external source that failed during analysis
/// contributes `None`, which the scorer treats as neutral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainSignals {
    pub domain_age_days: Option<i64>,
    pub ssl_valid: Option<bool>,
    pub http_status: Option<u16>,
    pub safe_browsing: Option<SafeBrowsingStatus>,
    pub hybrid_analysis: Option<HybridAnalysisStatus>,
}

/// Outcome of a blacklist lookup for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlacklistVerdict {
    pub is_blacklisted: bool,
    pub worst_type: Option<String>,
    pub max_severity: u8,
    pub penalty: f64,
}

impl BlacklistVerdict {
    /// Verdict for a domain with no matching patterns.
    pub fn clear() -> Self {
        Self::default()
    }
}
