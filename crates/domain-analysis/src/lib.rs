//! Trustline Domain Analyser
//!
//! Collects domain reputation signals from external sources:
//! - Registration age via RDAP (WHOIS successor)
//! - TLS validity and HTTP status via an HTTPS probe
//! - Google Safe Browsing verdicts
//! - Hybrid Analysis sandbox verdicts
//!
//! Each source gets a single attempt under its own deadline and contributes
//! a null signal on failure. A run only errors when every source failed and
//! no prior cache entry exists; a prior entry is retained untouched.

pub mod probe;
pub mod threat_apis;
pub mod whois;

use chrono::{Duration as ChronoDuration, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, info, warn};
use trustline_core::DomainSignals;
use trustline_db::{DbError, DomainCacheEntry, DomainUpdate, TrustDb};

/// Failure of a single external source. The analyser maps these to null
/// signals; only [`AnalysisError`] escapes this crate.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no API key configured")]
    MissingKey,

    #[error("unexpected payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("all analysis sources failed for {0}")]
    AllSourcesFailed(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Analyser configuration: endpoints, keys, and the per-source deadline.
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    pub source_timeout: Duration,
    pub rdap_base_url: String,
    pub safe_browsing_base_url: String,
    pub hybrid_analysis_base_url: String,
    pub safe_browsing_api_key: Option<String>,
    pub hybrid_analysis_api_key: Option<String>,
}

impl AnalyserConfig {
    /// Production endpoints with API keys pulled from the environment.
    pub fn from_env(source_timeout: Duration) -> Self {
        Self {
            source_timeout,
            rdap_base_url: "https://rdap.org".to_string(),
            safe_browsing_base_url: "https://safebrowsing.googleapis.com".to_string(),
            hybrid_analysis_base_url: "https://www.hybrid-analysis.com".to_string(),
            safe_browsing_api_key: std::env::var("SAFE_BROWSING_API_KEY").ok(),
            hybrid_analysis_api_key: std::env::var("HYBRID_ANALYSIS_API_KEY").ok(),
        }
    }
}

/// Report from a near-expiry refresh batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshReport {
    pub considered: usize,
    pub refreshed: u32,
    pub failed: u32,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} considered, {} refreshed, {} failed",
            self.considered, self.refreshed, self.failed
        )
    }
}

/// Domain analyser engine
pub struct DomainAnalyser {
    client: reqwest::Client,
    config: AnalyserConfig,
    db: Arc<TrustDb>,
    cache_ttl_days: i64,
}

impl DomainAnalyser {
    pub fn new(
        db: Arc<TrustDb>,
        config: AnalyserConfig,
        cache_ttl_days: i64,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(config.source_timeout)
            .user_agent(concat!("trustline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            db,
            cache_ttl_days,
        })
    }

    /// Collect all signals for one domain and upsert the cache entry.
    pub async fn analyze(&self, domain: &str) -> Result<DomainCacheEntry, AnalysisError> {
        debug!("Analyzing domain {}", domain);
        let deadline = self.config.source_timeout;

        let (whois, probe, safe_browsing, hybrid) = tokio::join!(
            time::timeout(
                deadline,
                whois::lookup(&self.client, &self.config.rdap_base_url, domain)
            ),
            time::timeout(deadline, probe::probe_https(&self.client, domain)),
            time::timeout(
                deadline,
                threat_apis::safe_browsing_status(
                    &self.client,
                    &self.config.safe_browsing_base_url,
                    self.config.safe_browsing_api_key.as_deref(),
                    domain,
                )
            ),
            time::timeout(
                deadline,
                threat_apis::hybrid_analysis_status(
                    &self.client,
                    &self.config.hybrid_analysis_base_url,
                    self.config.hybrid_analysis_api_key.as_deref(),
                    domain,
                )
            ),
        );

        let whois = flatten_source("whois", domain, whois);
        let probe = flatten_source("https probe", domain, probe);
        let safe_browsing = flatten_source("safe browsing", domain, safe_browsing);
        let hybrid = flatten_source("hybrid analysis", domain, hybrid);

        if whois.is_none() && probe.is_none() && safe_browsing.is_none() && hybrid.is_none() {
            if let Some(prior) = self.db.get_domain_entry(domain)? {
                warn!(
                    "All analysis sources failed for {}, keeping prior cache entry",
                    domain
                );
                return Ok(prior);
            }
            return Err(AnalysisError::AllSourcesFailed(domain.to_string()));
        }

        let (domain_age_days, whois_data) = match whois {
            Some(result) => (result.age_days, Some(result.raw)),
            None => (None, None),
        };
        let (ssl_valid, http_status) = match probe {
            Some(result) => (Some(result.ssl_valid), result.http_status),
            None => (None, None),
        };

        let signals = DomainSignals {
            domain_age_days,
            ssl_valid,
            http_status,
            safe_browsing,
            hybrid_analysis: hybrid,
        };

        let update = DomainUpdate {
            domain: domain.to_string(),
            domain_age_days,
            ssl_valid,
            http_status,
            google_safe_browsing_status: safe_browsing,
            hybrid_analysis_status: hybrid,
            whois_data,
            threat_score: Some(threat_score(&signals)),
        };
        let entry = self.db.upsert_domain_safe(&update, self.cache_ttl_days)?;

        info!(
            "Domain {} analyzed: age_days={:?}, ssl={:?}, http={:?}, gsb={:?}, hybrid={:?}",
            domain, domain_age_days, ssl_valid, http_status, safe_browsing, hybrid
        );
        Ok(entry)
    }

    /// Best-effort trigger used by the submit and query paths. Runs an
    /// analysis only when no valid cache entry exists; failures are
    /// swallowed. Returns whether an analysis was attempted.
    pub async fn ensure_analyzed(&self, domain: &str) -> bool {
        let presence = match self.db.check_domain_exists(domain) {
            Ok(presence) => presence,
            Err(e) => {
                warn!("Domain cache probe failed for {}: {}", domain, e);
                return false;
            }
        };
        if presence.valid {
            return false;
        }

        if let Err(e) = self.analyze(domain).await {
            warn!("Best-effort domain analysis failed for {}: {}", domain, e);
        }
        true
    }

    /// Nightly batch: refresh the entries closest to expiry, up to the
    /// external-API quota. Per-domain failures do not abort the batch.
    pub async fn refresh_near_expiry(&self, quota: u32) -> Result<RefreshReport, AnalysisError> {
        let horizon = Utc::now() + ChronoDuration::days(1);
        let domains = self.db.domains_expiring_before(horizon, quota)?;

        let mut report = RefreshReport {
            considered: domains.len(),
            ..Default::default()
        };
        for domain in &domains {
            match self.analyze(domain).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("Scheduled refresh failed for {}: {}", domain, e);
                }
            }
        }
        Ok(report)
    }
}

fn flatten_source<T>(
    name: &str,
    domain: &str,
    outcome: Result<Result<T, SourceError>, time::error::Elapsed>,
) -> Option<T> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(SourceError::MissingKey)) => {
            debug!("{} skipped for {}: no API key", name, domain);
            None
        }
        Ok(Err(e)) => {
            warn!("{} failed for {}: {}", name, domain, e);
            None
        }
        Err(_) => {
            warn!("{} timed out for {}", name, domain);
            None
        }
    }
}

/// Summarise collected signals into a 0-1 threat score for the cache entry.
fn threat_score(signals: &DomainSignals) -> f64 {
    use trustline_core::{HybridAnalysisStatus, SafeBrowsingStatus};

    let mut score: f64 = 0.0;

    if let Some(age) = signals.domain_age_days {
        if age < 30 {
            score += 0.3;
        }
    }
    if signals.ssl_valid == Some(false) {
        score += 0.2;
    }
    if let Some(status) = signals.http_status {
        if status >= 400 {
            score += 0.1;
        }
    }
    score += match signals.safe_browsing {
        Some(SafeBrowsingStatus::Malware) => 0.5,
        Some(SafeBrowsingStatus::Phishing) => 0.45,
        Some(SafeBrowsingStatus::Unwanted) => 0.3,
        Some(SafeBrowsingStatus::Clean) | None => 0.0,
    };
    score += match signals.hybrid_analysis {
        Some(HybridAnalysisStatus::Malicious) => 0.4,
        Some(HybridAnalysisStatus::Suspicious) => 0.25,
        Some(HybridAnalysisStatus::Clean) | None => 0.0,
    };

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustline_core::{HybridAnalysisStatus, SafeBrowsingStatus};

    #[test]
    fn threat_score_is_zero_for_clean_signals() {
        let signals = DomainSignals {
            domain_age_days: Some(4000),
            ssl_valid: Some(true),
            http_status: Some(200),
            safe_browsing: Some(SafeBrowsingStatus::Clean),
            hybrid_analysis: Some(HybridAnalysisStatus::Clean),
        };
        assert_eq!(threat_score(&signals), 0.0);
    }

    #[test]
    fn threat_score_accumulates_and_saturates() {
        let bad = DomainSignals {
            domain_age_days: Some(5),
            ssl_valid: Some(false),
            http_status: Some(404),
            safe_browsing: Some(SafeBrowsingStatus::Malware),
            hybrid_analysis: Some(HybridAnalysisStatus::Malicious),
        };
        assert_eq!(threat_score(&bad), 1.0);

        let mild = DomainSignals {
            ssl_valid: Some(false),
            ..Default::default()
        };
        assert!((threat_score(&mild) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn null_signals_contribute_nothing() {
        assert_eq!(threat_score(&DomainSignals::default()), 0.0);
    }
}
