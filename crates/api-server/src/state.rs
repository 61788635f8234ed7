//! Application state management

use crate::error::ApiError;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use chrono::Utc;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use trustline_auth::AuthService;
use trustline_core::TrustConfig;
use trustline_db::{BlacklistEntry, NewContentTypeRule, TrustDb};
use trustline_domain_analysis::{AnalyserConfig, DomainAnalyser};
use trustline_metrics::MetricsCollector;
use trustline_pipeline::{Aggregator, Janitor, RuleLearner, Scheduler};

/// Trust-config key overriding the nightly refresh quota.
pub const DAILY_QUOTA_KEY: &str = "analysis_daily_quota";

/// Shared application state
pub struct AppState {
    pub config: TrustConfig,
    pub start_time: Instant,
    pub db: Arc<TrustDb>,
    pub aggregator: Arc<Aggregator>,
    pub analyser: Arc<DomainAnalyser>,
    pub scheduler: Arc<Scheduler>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<MetricsCollector>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Create new application state with async initialization
    pub async fn new(config: TrustConfig) -> anyhow::Result<Arc<Self>> {
        info!("Initializing application state");

        let db_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "data/trustline.db".to_string());
        let db = Arc::new(TrustDb::new(&db_path)?);
        info!("SQLite database initialized: {}", db_path);

        // Seed blacklist patterns and content-type rules shipped with the
        // deployment. Inserts are idempotent across restarts.
        Self::seed_blacklist(&db, "config/blacklist-seed.json");
        Self::seed_content_type_rules(&db, "config/content-type-rules.json");

        let analyser = Arc::new(DomainAnalyser::new(
            db.clone(),
            AnalyserConfig::from_env(Duration::from_secs(config.analysis.source_timeout_secs)),
            config.retention.domain_cache_ttl_days,
        )?);
        info!("Domain analyser initialized");

        let aggregator = Arc::new(Aggregator::new(
            db.clone(),
            config.limits.aggregator_soft_cap,
        ));

        let jwt_secret = std::env::var("TRUSTLINE_JWT_SECRET")
            .unwrap_or_else(|_| "trustline-default-jwt-secret-change-in-production".to_string());
        let auth = Arc::new(AuthService::new(&jwt_secret));
        info!("Authentication service initialized");

        let rate_limiter = Arc::new(RateLimiter::with_config(RateLimiterConfig {
            max_requests: config.limits.rate_limit_per_minute,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }));
        info!("Rate limiter initialized");

        let metrics = Arc::new(MetricsCollector::new());

        let scheduler = Arc::new(Scheduler::new());
        Self::register_jobs(&config, &scheduler, &db, &aggregator, &analyser, &metrics);
        info!(
            "Scheduler initialized (aggregation every {}s)",
            config.scheduler.aggregate_interval_secs
        );

        Ok(Arc::new(Self {
            config,
            start_time: Instant::now(),
            db,
            aggregator,
            analyser,
            scheduler,
            rate_limiter,
            metrics,
            auth,
        }))
    }

    fn register_jobs(
        config: &TrustConfig,
        scheduler: &Scheduler,
        db: &Arc<TrustDb>,
        aggregator: &Arc<Aggregator>,
        analyser: &Arc<DomainAnalyser>,
        metrics: &Arc<MetricsCollector>,
    ) {
        let aggregate_interval = Duration::from_secs(config.scheduler.aggregate_interval_secs);
        let daily = Duration::from_secs(config.scheduler.janitor_interval_secs);
        let refresh_interval = Duration::from_secs(config.scheduler.domain_refresh_interval_secs);
        let learner_interval = Duration::from_secs(config.scheduler.rule_learner_interval_secs);

        {
            let aggregator = aggregator.clone();
            let metrics = metrics.clone();
            scheduler.register("aggregate", aggregate_interval, move || {
                let aggregator = aggregator.clone();
                let metrics = metrics.clone();
                async move {
                    match aggregator.run_tick().await {
                        Ok(report) => {
                            metrics.record_ratings_aggregated(report.ratings_marked);
                            report.to_string()
                        }
                        Err(e) => format!("aggregation failed: {e}"),
                    }
                }
            });
        }

        {
            let analyser = analyser.clone();
            let db = db.clone();
            let metrics = metrics.clone();
            let default_quota = config.analysis.daily_refresh_quota;
            scheduler.register("domain-refresh", refresh_interval, move || {
                let analyser = analyser.clone();
                let db = db.clone();
                let metrics = metrics.clone();
                async move {
                    let quota = db
                        .get_config_u64(DAILY_QUOTA_KEY, default_quota as u64)
                        .unwrap_or(default_quota as u64) as u32;
                    match analyser.refresh_near_expiry(quota).await {
                        Ok(report) => {
                            for _ in 0..report.refreshed {
                                metrics.record_analysis(true);
                            }
                            for _ in 0..report.failed {
                                metrics.record_analysis(false);
                            }
                            report.to_string()
                        }
                        Err(e) => format!("domain refresh failed: {e}"),
                    }
                }
            });
        }

        {
            let learner = RuleLearner::new(db.clone(), config.limits.rule_learner_batch);
            scheduler.register("rule-learner", learner_interval, move || {
                let report = learner.run();
                async move {
                    match report {
                        Ok(report) => report.to_string(),
                        Err(e) => format!("rule learning failed: {e}"),
                    }
                }
            });
        }

        let janitor = Arc::new(Janitor::new(db.clone(), config.retention.clone()));
        {
            let janitor = janitor.clone();
            scheduler.register("rating-janitor", daily, move || {
                let result = janitor.prune_ratings();
                async move { result.unwrap_or_else(|e| format!("rating janitor failed: {e}")) }
            });
        }
        {
            let janitor = janitor.clone();
            scheduler.register("domain-cache-janitor", daily, move || {
                let result = janitor.prune_domain_cache();
                async move { result.unwrap_or_else(|e| format!("cache janitor failed: {e}")) }
            });
        }
        {
            scheduler.register("stale-stats-sweep", daily, move || {
                let result = janitor.sweep_stale_url_stats();
                async move { result.unwrap_or_else(|e| format!("stale sweep failed: {e}")) }
            });
        }
    }

    /// Record and return an error so every envelope shows up in the error
    /// counters.
    pub fn fail(&self, error: ApiError) -> ApiError {
        self.metrics.record_error(error.code.as_str());
        error
    }

    /// Per-IP limit applied to every public route.
    pub fn check_rate_limit(&self, ip: IpAddr) -> Result<(), ApiError> {
        match self.rate_limiter.check(ip) {
            crate::rate_limiter::RateLimitResult::Allowed { .. } => Ok(()),
            crate::rate_limiter::RateLimitResult::Limited { retry_after_secs } => {
                Err(ApiError::rate_limited(retry_after_secs))
            }
        }
    }

    /// Load blacklist seed patterns from the config directory.
    fn seed_blacklist(db: &TrustDb, path: &str) {
        #[derive(Deserialize)]
        struct SeedFile {
            patterns: Vec<SeedPattern>,
        }
        #[derive(Deserialize)]
        struct SeedPattern {
            pattern: String,
            blacklist_type: String,
            severity: u8,
        }

        if !Path::new(path).exists() {
            warn!("Blacklist seed file not found: {}", path);
            return;
        }

        let seeds: SeedFile = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(seeds) => seeds,
            Err(e) => {
                warn!("Failed to load blacklist seed {}: {}", path, e);
                return;
            }
        };

        let mut inserted = 0;
        for seed in seeds.patterns {
            let entry = BlacklistEntry {
                pattern: seed.pattern,
                blacklist_type: seed.blacklist_type,
                severity: seed.severity.clamp(1, 10),
                active: true,
                added_at: Utc::now(),
            };
            match db.insert_blacklist_pattern(&entry) {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to seed blacklist pattern: {}", e),
            }
        }
        if inserted > 0 {
            info!("Seeded {} blacklist patterns from {}", inserted, path);
        }
    }

    /// Load bootstrap content-type rules from the config directory.
    fn seed_content_type_rules(db: &TrustDb, path: &str) {
        #[derive(Deserialize)]
        struct SeedFile {
            rules: Vec<SeedRule>,
        }
        #[derive(Deserialize)]
        struct SeedRule {
            domain: String,
            content_type: String,
            #[serde(default)]
            url_pattern: Option<String>,
            trust_score_modifier: i32,
            min_ratings_required: u32,
            #[serde(default)]
            description: String,
        }

        if !Path::new(path).exists() {
            warn!("Content-type rule seed file not found: {}", path);
            return;
        }

        let seeds: SeedFile = match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(seeds) => seeds,
            Err(e) => {
                warn!("Failed to load rule seed {}: {}", path, e);
                return;
            }
        };

        let mut inserted = 0;
        for seed in seeds.rules {
            // Domains that already carry an active rule keep it; seeding
            // never overrides learned rules
            match db.has_active_rule(&seed.domain) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Rule lookup failed during seeding: {}", e);
                    continue;
                }
            }
            let rule = NewContentTypeRule {
                domain: seed.domain,
                content_type: seed.content_type,
                url_pattern: seed.url_pattern,
                trust_score_modifier: seed.trust_score_modifier.clamp(-10, 10),
                min_ratings_required: seed.min_ratings_required.clamp(1, 10),
                description: seed.description,
            };
            match db.insert_content_type_rule(&rule) {
                Ok(_) => inserted += 1,
                Err(e) => warn!("Failed to seed content-type rule: {}", e),
            }
        }
        if inserted > 0 {
            info!("Seeded {} content-type rules from {}", inserted, path);
        }
    }
}
