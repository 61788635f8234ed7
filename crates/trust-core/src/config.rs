//! Service configuration

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    pub server: ServerSettings,
    pub scheduler: SchedulerSettings,
    pub analysis: AnalysisSettings,
    pub retention: RetentionSettings,
    pub limits: LimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
    pub bind_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub aggregate_interval_secs: u64,
    pub domain_refresh_interval_secs: u64,
    pub rule_learner_interval_secs: u64,
    pub janitor_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Single-attempt deadline for each external source.
    pub source_timeout_secs: u64,
    /// Near-expiry entries refreshed per nightly batch.
    pub daily_refresh_quota: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Processed ratings older than this are pruned.
    pub rating_retention_days: i64,
    /// Lifetime of a domain cache entry from `last_checked`.
    pub domain_cache_ttl_days: i64,
    /// Expired cache entries linger this long before the janitor removes them.
    pub expired_cache_grace_days: i64,
    /// URL stats idle longer than this are swept.
    pub stale_stats_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Unprocessed fingerprints handled per aggregator tick.
    pub aggregator_soft_cap: u32,
    /// Domains examined per rule learner run.
    pub rule_learner_batch: u32,
    /// Requests per minute per client IP.
    pub rate_limit_per_minute: u32,
    /// Overall request handler deadline.
    pub handler_timeout_secs: u64,
    /// Maximum URLs in one batch stats request.
    pub batch_max_urls: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "0.0.0.0".to_string(),
                bind_port: 8080,
            },
            scheduler: SchedulerSettings {
                aggregate_interval_secs: 300,
                domain_refresh_interval_secs: 86_400,
                rule_learner_interval_secs: 86_400,
                janitor_interval_secs: 86_400,
            },
            analysis: AnalysisSettings {
                source_timeout_secs: 10,
                daily_refresh_quota: 20,
            },
            retention: RetentionSettings {
                rating_retention_days: 7,
                domain_cache_ttl_days: 7,
                expired_cache_grace_days: 1,
                stale_stats_days: 30,
            },
            limits: LimitSettings {
                aggregator_soft_cap: 500,
                rule_learner_batch: 50,
                rate_limit_per_minute: 100,
                handler_timeout_secs: 15,
                batch_max_urls: 50,
            },
        }
    }
}

impl TrustConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrustConfig =
            serde_json::from_str(&content).map_err(|e| anyhow!("Failed to parse config: {}", e))?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_contract() {
        let config = TrustConfig::default();
        assert_eq!(config.scheduler.aggregate_interval_secs, 300);
        assert_eq!(config.analysis.source_timeout_secs, 10);
        assert_eq!(config.analysis.daily_refresh_quota, 20);
        assert_eq!(config.retention.rating_retention_days, 7);
        assert_eq!(config.retention.domain_cache_ttl_days, 7);
        assert_eq!(config.limits.batch_max_urls, 50);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = TrustConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrustConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.server.bind_port, config.server.bind_port);
        assert_eq!(
            parsed.limits.aggregator_soft_cap,
            config.limits.aggregator_soft_cap
        );
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let path = std::env::temp_dir().join("trustline-config-test.json");
        let mut config = TrustConfig::default();
        config.server.bind_port = 9999;
        config.save(&path).unwrap();

        let loaded = TrustConfig::from_file(&path).unwrap();
        assert_eq!(loaded.server.bind_port, 9999);
        std::fs::remove_file(&path).ok();
    }
}
