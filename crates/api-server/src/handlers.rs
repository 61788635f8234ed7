//! API request handlers

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use trustline_auth::Claims;
use trustline_core::{CacheStatus, DataSource, RatingAggregates, UrlIdentity};
use trustline_db::{CacheStatistics, Rating, UrlStats};
use trustline_domain_analysis::AnalysisError;
use trustline_metrics::MetricsSnapshot;
use trustline_pipeline::JobHealth;

use crate::error::ApiError;
use crate::rate_limiter::RateLimiterStats;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub url: String,
    pub url_hash: String,
    pub domain: Option<String>,
    pub final_trust_score: f64,
    /// Legacy alias of `final_trust_score`, kept for older clients.
    pub trust_score: f64,
    pub domain_trust_score: f64,
    pub community_trust_score: f64,
    pub content_type: String,
    pub rating_count: u64,
    pub average_rating: f64,
    pub spam_reports_count: u64,
    pub misleading_reports_count: u64,
    pub scam_reports_count: u64,
    pub last_updated: String,
    pub data_source: &'static str,
    pub cache_status: &'static str,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub url: String,
}

#[derive(Deserialize)]
pub struct BatchStatsRequest {
    pub urls: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum BatchStatsResult {
    Stats(Box<StatsResponse>),
    Error {
        url: String,
        error: String,
        code: &'static str,
    },
}

#[derive(Deserialize)]
pub struct SubmitRatingRequest {
    pub url: String,
    pub score: u8,
    #[serde(default, rename = "isSpam")]
    pub is_spam: bool,
    #[serde(default, rename = "isMisleading")]
    pub is_misleading: bool,
    #[serde(default, rename = "isScam")]
    pub is_scam: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitRatingResponse {
    pub message: String,
    #[serde(rename = "urlStats")]
    pub url_stats: StatsResponse,
    pub processing: ProcessingInfo,
}

#[derive(Debug, Serialize)]
pub struct ProcessingInfo {
    pub domain_analysis_triggered: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct UpdateConfigRequest {
    pub value: String,
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub message: String,
    pub stores: CacheStatistics,
    pub jobs: BTreeMap<String, JobHealth>,
    pub metrics: MetricsSnapshot,
    pub rate_limiter: RateLimiterStats,
}

#[derive(Serialize)]
pub struct ErrorStatsResponse {
    pub message: String,
    pub total_errors: u64,
    pub errors_by_code: BTreeMap<String, u64>,
}

#[derive(Serialize)]
pub struct DomainRefreshResponse {
    pub message: String,
    pub domain: String,
    pub cache_expires_at: String,
}

/// Cap every handler at the configured deadline; a timeout surfaces as an
/// internal error without partial writes.
async fn with_deadline<T>(
    secs: u64,
    work: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(Duration::from_secs(secs), work).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::internal("request deadline exceeded")),
    }
}

// ============================================================================
// Health & Metrics Endpoints
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus metrics endpoint
pub async fn metrics_text(State(state): State<Arc<AppState>>) -> String {
    let snapshot = state.metrics.snapshot();
    let mut output = String::with_capacity(2048);

    output.push_str("# HELP trustline_ratings_submitted_total Total ratings accepted\n");
    output.push_str("# TYPE trustline_ratings_submitted_total counter\n");
    output.push_str(&format!(
        "trustline_ratings_submitted_total {}\n",
        snapshot.ratings_submitted
    ));

    output.push_str("# HELP trustline_stats_queries_total Total stats queries\n");
    output.push_str("# TYPE trustline_stats_queries_total counter\n");
    output.push_str(&format!(
        "trustline_stats_queries_total {}\n",
        snapshot.stats_queries
    ));

    output.push_str("# HELP trustline_domain_cache_hit_rate Valid cache entries per lookup\n");
    output.push_str("# TYPE trustline_domain_cache_hit_rate gauge\n");
    output.push_str(&format!(
        "trustline_domain_cache_hit_rate {:.4}\n",
        snapshot.domain_cache_hit_rate
    ));

    output.push_str("# HELP trustline_analyses_run_total Domain analyses attempted\n");
    output.push_str("# TYPE trustline_analyses_run_total counter\n");
    output.push_str(&format!(
        "trustline_analyses_run_total {}\n",
        snapshot.analyses_run
    ));

    output.push_str("# HELP trustline_ratings_aggregated_total Ratings folded into URL stats\n");
    output.push_str("# TYPE trustline_ratings_aggregated_total counter\n");
    output.push_str(&format!(
        "trustline_ratings_aggregated_total {}\n",
        snapshot.ratings_aggregated
    ));

    output.push_str("# HELP trustline_errors_total Error envelopes returned\n");
    output.push_str("# TYPE trustline_errors_total counter\n");
    output.push_str(&format!("trustline_errors_total {}\n", snapshot.total_errors));

    output.push_str("# HELP trustline_uptime_seconds Server uptime in seconds\n");
    output.push_str("# TYPE trustline_uptime_seconds gauge\n");
    output.push_str(&format!(
        "trustline_uptime_seconds {}\n",
        state.start_time.elapsed().as_secs()
    ));

    output
}

// ============================================================================
// Stats Endpoints
// ============================================================================

/// GetStats: stored row, re-scored when stale, or a synthesised baseline.
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    state
        .check_rate_limit(addr.ip())
        .map_err(|e| state.fail(e))?;
    state.metrics.record_stats_query();

    let deadline = state.config.limits.handler_timeout_secs;
    with_deadline(deadline, stats_for_url(&state, &query.url))
        .await
        .map(Json)
        .map_err(|e| state.fail(e))
}

/// Batch stats: up to the configured cap, one result per URL in order.
pub async fn batch_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<BatchStatsRequest>,
) -> Result<Json<Vec<BatchStatsResult>>, ApiError> {
    state
        .check_rate_limit(addr.ip())
        .map_err(|e| state.fail(e))?;

    let max = state.config.limits.batch_max_urls;
    if request.urls.len() > max {
        return Err(state.fail(ApiError::validation(format!(
            "batch accepts at most {max} URLs"
        ))));
    }

    let deadline = state.config.limits.handler_timeout_secs;
    let work = async {
        let mut results = Vec::with_capacity(request.urls.len());
        for url in &request.urls {
            state.metrics.record_stats_query();
            match stats_for_url(&state, url).await {
                Ok(stats) => results.push(BatchStatsResult::Stats(Box::new(stats))),
                Err(e) => {
                    state.metrics.record_error(e.code.as_str());
                    results.push(BatchStatsResult::Error {
                        url: url.clone(),
                        error: e.message,
                        code: e.code.as_str(),
                    });
                }
            }
        }
        Ok(results)
    };
    with_deadline(deadline, work)
        .await
        .map(Json)
        .map_err(|e| state.fail(e))
}

/// Shared GetStats computation, also used per-URL by the batch endpoint.
async fn stats_for_url(state: &Arc<AppState>, url: &str) -> Result<StatsResponse, ApiError> {
    let id = UrlIdentity::from_raw(url)?;
    let now = Utc::now();

    let entry = state.db.get_domain_entry(&id.domain)?;
    let cache_status = match &entry {
        Some(e) if e.is_valid_at(now) => CacheStatus::Valid,
        Some(_) => CacheStatus::Expired,
        None => CacheStatus::Missing,
    };
    if cache_status == CacheStatus::Valid {
        state.metrics.record_domain_cache_hit();
    } else {
        state.metrics.record_domain_cache_miss();
    }

    // First sight of a domain: analysis runs in the background so the query
    // itself stays fast and never fails over it
    if entry.is_none() {
        let analyser = state.analyser.clone();
        let domain = id.domain.clone();
        tokio::spawn(async move {
            analyser.ensure_analyzed(&domain).await;
        });
    }

    match state.db.get_url_stats(&id.fingerprint)? {
        Some(stats) => {
            let interval =
                chrono::Duration::seconds(state.config.scheduler.aggregate_interval_secs as i64);
            let cache_refreshed_since = entry
                .as_ref()
                .map(|e| e.last_checked > stats.last_updated)
                .unwrap_or(false);

            let stats = if now - stats.last_updated > interval || cache_refreshed_since {
                debug!("Stale stats for {}, re-scoring", id.fingerprint);
                state
                    .aggregator
                    .refresh_fingerprint(&id.fingerprint)?
                    .unwrap_or(stats)
            } else {
                stats
            };

            let data_source = stats.processing_status.data_source();
            Ok(stats_response(&id, &stats, data_source, cache_status))
        }
        None => {
            // Nothing aggregated yet: synthesise a baseline without persisting
            let baseline = state.aggregator.compute_stats(
                &id.fingerprint,
                &id.canonical,
                &id.domain,
                RatingAggregates::default(),
            )?;
            let data_source = if cache_status == CacheStatus::Valid {
                DataSource::Domain
            } else {
                DataSource::Baseline
            };
            Ok(stats_response(&id, &baseline, data_source, cache_status))
        }
    }
}

fn stats_response(
    id: &UrlIdentity,
    stats: &UrlStats,
    data_source: DataSource,
    cache_status: CacheStatus,
) -> StatsResponse {
    StatsResponse {
        url: id.canonical.clone(),
        url_hash: id.fingerprint.clone(),
        domain: stats.domain.clone().or_else(|| Some(id.domain.clone())),
        final_trust_score: stats.final_score,
        trust_score: stats.final_score,
        domain_trust_score: stats.domain_score,
        community_trust_score: stats.community_score,
        content_type: stats.content_type.clone(),
        rating_count: stats.rating_count,
        average_rating: stats.avg_rating,
        spam_reports_count: stats.spam_count,
        misleading_reports_count: stats.misleading_count,
        scam_reports_count: stats.scam_count,
        last_updated: stats.last_updated.to_rfc3339(),
        data_source: data_source.as_str(),
        cache_status: cache_status.as_str(),
    }
}

// ============================================================================
// Rating Submission
// ============================================================================

/// SubmitRating: validate, cooldown-checked append, best-effort domain
/// analysis, then a synchronous refresh so the response reflects the new
/// rating.
pub async fn submit_rating(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<SubmitRatingRequest>,
) -> Result<Json<SubmitRatingResponse>, ApiError> {
    state
        .check_rate_limit(addr.ip())
        .map_err(|e| state.fail(e))?;

    let deadline = state.config.limits.handler_timeout_secs;
    with_deadline(deadline, submit_rating_inner(&state, &claims.sub, request))
        .await
        .map(Json)
        .map_err(|e| state.fail(e))
}

async fn submit_rating_inner(
    state: &Arc<AppState>,
    user_id: &str,
    request: SubmitRatingRequest,
) -> Result<SubmitRatingResponse, ApiError> {
    if !(1..=5).contains(&request.score) {
        return Err(ApiError::validation("score must be between 1 and 5"));
    }
    let id = UrlIdentity::from_raw(&request.url)?;

    let rating = Rating {
        fingerprint: id.fingerprint.clone(),
        url: id.canonical.clone(),
        domain: id.domain.clone(),
        user_id: user_id.to_string(),
        stars: request.score,
        spam: request.is_spam,
        misleading: request.is_misleading,
        scam: request.is_scam,
        processed: false,
        created_at: Utc::now(),
    };
    state.db.append_rating(&rating)?;
    state.metrics.record_rating_submitted();
    info!("Rating accepted for {} by {}", id.fingerprint, user_id);

    // Best-effort: a failed analysis must not fail the submission
    let domain_analysis_triggered = state.analyser.ensure_analyzed(&id.domain).await;

    // Read back after writing: the refresh sees this append and all prior
    // ones, so the client observes its own rating
    let stats = state
        .aggregator
        .refresh_fingerprint(&id.fingerprint)?
        .ok_or_else(|| ApiError::internal("stats refresh returned no data"))?;

    let presence = state.db.check_domain_exists(&id.domain)?;
    let cache_status = if presence.valid {
        CacheStatus::Valid
    } else if presence.exists {
        CacheStatus::Expired
    } else {
        CacheStatus::Missing
    };
    let data_source = stats.processing_status.data_source();

    Ok(SubmitRatingResponse {
        message: "Rating accepted".to_string(),
        url_stats: stats_response(&id, &stats, data_source, cache_status),
        processing: ProcessingInfo {
            domain_analysis_triggered,
        },
    })
}

// ============================================================================
// Admin / Ops Endpoints
// ============================================================================

/// Trigger a one-off aggregation run.
pub async fn run_aggregation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let report = state
        .aggregator
        .run_tick()
        .await
        .map_err(|e| state.fail(e.into()))?;
    state.metrics.record_ratings_aggregated(report.ratings_marked);

    Ok(Json(MessageResponse {
        message: format!("Aggregation complete: {report}"),
    }))
}

/// Force-refresh the cache entry for one domain.
pub async fn refresh_domain(
    Path(domain): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DomainRefreshResponse>, ApiError> {
    let domain = domain.to_lowercase();
    if domain.is_empty()
        || domain.len() > 253
        || !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(state.fail(ApiError::validation("invalid domain name")));
    }

    match state.analyser.analyze(&domain).await {
        Ok(entry) => {
            state.metrics.record_analysis(true);
            Ok(Json(DomainRefreshResponse {
                message: format!("Domain {domain} refreshed"),
                domain,
                cache_expires_at: entry.cache_expires_at.to_rfc3339(),
            }))
        }
        Err(e) => {
            state.metrics.record_analysis(false);
            let error = match e {
                AnalysisError::Db(db) => db.into(),
                other => ApiError::internal(other.to_string()),
            };
            Err(state.fail(error))
        }
    }
}

/// Update a trust-config key.
pub async fn update_config(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .db
        .set_config_value(&key, &request.value)
        .map_err(|e| state.fail(e.into()))?;
    info!("Trust config updated: {} = {}", key, request.value);

    Ok(Json(MessageResponse {
        message: format!("Config key '{key}' updated"),
    }))
}

/// Store, scheduler, and collector statistics in one place.
pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheStatsResponse>, ApiError> {
    let stores = state
        .db
        .cache_statistics()
        .map_err(|e| state.fail(e.into()))?;

    Ok(Json(CacheStatsResponse {
        message: format!(
            "{} URL stats rows, {} cached domains ({} valid)",
            stores.url_stats_rows, stores.domain_cache_rows, stores.domain_cache_valid
        ),
        stores,
        jobs: state.scheduler.health_snapshot(),
        metrics: state.metrics.snapshot(),
        rate_limiter: state.rate_limiter.stats(),
    }))
}

/// Error counters grouped by envelope code.
pub async fn error_stats(State(state): State<Arc<AppState>>) -> Json<ErrorStatsResponse> {
    let errors_by_code = state.metrics.error_counts();
    let total_errors: u64 = errors_by_code.values().sum();

    Json(ErrorStatsResponse {
        message: format!("{total_errors} errors recorded since start"),
        total_errors,
        errors_by_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
    use std::time::Instant;
    use trustline_core::TrustConfig;
    use trustline_db::{DomainUpdate, TrustDb};
    use trustline_domain_analysis::{AnalyserConfig, DomainAnalyser};
    use trustline_metrics::MetricsCollector;
    use trustline_pipeline::{Aggregator, Scheduler};

    /// State over an in-memory store with analyser endpoints pointing at a
    /// closed local port, so nothing in these tests touches the network.
    fn test_state() -> Arc<AppState> {
        let db = Arc::new(TrustDb::in_memory().unwrap());
        let analyser_config = AnalyserConfig {
            source_timeout: Duration::from_millis(200),
            rdap_base_url: "http://127.0.0.1:9".to_string(),
            safe_browsing_base_url: "http://127.0.0.1:9".to_string(),
            hybrid_analysis_base_url: "http://127.0.0.1:9".to_string(),
            safe_browsing_api_key: None,
            hybrid_analysis_api_key: None,
        };
        let analyser = Arc::new(DomainAnalyser::new(db.clone(), analyser_config, 7).unwrap());
        let aggregator = Arc::new(Aggregator::new(db.clone(), 500));

        Arc::new(AppState {
            config: TrustConfig::default(),
            start_time: Instant::now(),
            db,
            aggregator,
            analyser,
            scheduler: Arc::new(Scheduler::new()),
            rate_limiter: Arc::new(RateLimiter::with_config(RateLimiterConfig::default())),
            metrics: Arc::new(MetricsCollector::new()),
            auth: Arc::new(trustline_auth::AuthService::new("test-secret")),
        })
    }

    fn submit(url: &str, score: u8) -> SubmitRatingRequest {
        SubmitRatingRequest {
            url: url.to_string(),
            score,
            is_spam: false,
            is_misleading: false,
            is_scam: false,
        }
    }

    #[tokio::test]
    async fn unseen_url_gets_a_baseline() {
        let state = test_state();
        let response = stats_for_url(&state, "https://unseen.example/").await.unwrap();

        assert_eq!(response.community_trust_score, 50.0);
        assert_eq!(response.domain_trust_score, 50.0);
        assert_eq!(response.final_trust_score, 50.0);
        assert_eq!(response.trust_score, 50.0);
        assert_eq!(response.data_source, "baseline");
        assert_eq!(response.cache_status, "missing");
        assert_eq!(response.rating_count, 0);
        // Baseline synthesis is never persisted
        assert!(state.db.get_url_stats(&response.url_hash).unwrap().is_none());
    }

    #[tokio::test]
    async fn first_rating_reflects_immediately_and_repeat_conflicts() {
        let state = test_state();
        let url = "https://fresh.example/page";

        let response = submit_rating_inner(&state, "alice", submit(url, 5))
            .await
            .unwrap();
        assert_eq!(response.url_stats.rating_count, 1);
        assert_eq!(response.url_stats.average_rating, 5.0);
        // base 100 blended at confidence 0.2: community 60, fused with 50
        assert_eq!(response.url_stats.community_trust_score, 60.0);
        assert_eq!(response.url_stats.domain_trust_score, 50.0);
        assert_eq!(response.url_stats.final_trust_score, 56.0);
        assert!(response.processing.domain_analysis_triggered);

        let again = submit_rating_inner(&state, "alice", submit(url, 4)).await;
        let error = again.unwrap_err();
        assert_eq!(error.code, crate::error::ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn submit_then_query_increases_count() {
        let state = test_state();
        let url = "https://counted.example/item";

        let before = stats_for_url(&state, url).await.unwrap();
        assert_eq!(before.rating_count, 0);

        submit_rating_inner(&state, "alice", submit(url, 3)).await.unwrap();
        let after = stats_for_url(&state, url).await.unwrap();
        assert_eq!(after.rating_count, 1);

        submit_rating_inner(&state, "bob", submit(url, 5)).await.unwrap();
        let later = stats_for_url(&state, url).await.unwrap();
        assert_eq!(later.rating_count, 2);
        assert!(later.rating_count > after.rating_count);
    }

    #[tokio::test]
    async fn spam_reports_drive_the_score_down() {
        let state = test_state();
        let url = "https://reported.example/";

        for user in ["a", "b", "c"] {
            let mut request = submit(url, 1);
            request.is_spam = true;
            submit_rating_inner(&state, user, request).await.unwrap();
        }

        let response = stats_for_url(&state, url).await.unwrap();
        assert_eq!(response.rating_count, 3);
        assert_eq!(response.spam_reports_count, 3);
        // base 0 minus spam penalty 30, blended at confidence 0.6
        assert_eq!(response.community_trust_score, 2.0);
        assert_eq!(response.final_trust_score, 21.2);
    }

    #[tokio::test]
    async fn out_of_range_stars_rejected() {
        let state = test_state();
        for score in [0u8, 6] {
            let error = submit_rating_inner(&state, "alice", submit("https://x.example/", score))
                .await
                .unwrap_err();
            assert_eq!(error.code, crate::error::ErrorCode::ValidationError);
        }
    }

    #[tokio::test]
    async fn invalid_urls_rejected_everywhere() {
        let state = test_state();
        let error = stats_for_url(&state, "not-a-url").await.unwrap_err();
        assert_eq!(error.code, crate::error::ErrorCode::ValidationError);

        let error = submit_rating_inner(&state, "alice", submit("ftp://files.example/", 3))
            .await
            .unwrap_err();
        assert_eq!(error.code, crate::error::ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn valid_cache_entry_annotates_domain_source() {
        let state = test_state();
        state
            .db
            .upsert_domain_safe(
                &DomainUpdate {
                    domain: "cached.example".to_string(),
                    domain_age_days: Some(2000),
                    ssl_valid: Some(true),
                    http_status: Some(200),
                    ..Default::default()
                },
                7,
            )
            .unwrap();

        let response = stats_for_url(&state, "https://cached.example/").await.unwrap();
        assert_eq!(response.cache_status, "valid");
        assert_eq!(response.data_source, "domain");
        // 50 + 10 (age) + 5 (ssl) = 65, fused with neutral community
        assert_eq!(response.domain_trust_score, 65.0);
        assert_eq!(response.final_trust_score, 56.0);

        // With a valid entry in place, submissions skip re-analysis
        let submitted = submit_rating_inner(&state, "alice", submit("https://cached.example/", 4))
            .await
            .unwrap();
        assert!(!submitted.processing.domain_analysis_triggered);
        assert_eq!(submitted.url_stats.data_source, "enhanced");
    }
}
