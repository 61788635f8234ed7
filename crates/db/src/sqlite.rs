//! SQLite database operations
//!
//! Handles all relational data:
//! - Rating log with cooldown enforcement and retention
//! - Aggregated URL stats
//! - Domain reputation cache with TTLs
//! - Blacklist patterns and content-type rules
//! - Trust-config key/value overrides

use crate::error::DbError;
use crate::models::*;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::debug;
use trustline_core::{
    BlacklistVerdict, HybridAnalysisStatus, ProcessingStatus, RatingAggregates, SafeBrowsingStatus,
};

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConn = PooledConnection<SqliteConnectionManager>;

/// SQLite database wrapper with connection pooling
pub struct TrustDb {
    pool: SqlitePool,
}

/// Fixed-width RFC3339 so lexicographic column comparisons stay chronological.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Upserts retry once on lock contention; anything else surfaces as-is.
fn execute_with_retry(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<usize, DbError> {
    match conn.execute(sql, params) {
        Err(e) if is_busy(&e) => Ok(conn.execute(sql, params)?),
        other => Ok(other?),
    }
}

impl TrustDb {
    /// Create new SQLite connection pool
    pub fn new(path: &str) -> Result<Self, DbError> {
        if path == ":memory:" {
            return Self::in_memory();
        }

        // Ensure data directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self { pool };
        db.init_schema()?;

        Ok(db)
    }

    /// In-memory database for tests. A single pooled connection keeps every
    /// call on the same `:memory:` instance.
    pub fn in_memory() -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<SqliteConn, DbError> {
        Ok(self.pool.get()?)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), DbError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Append-only rating log
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                url TEXT NOT NULL,
                domain TEXT NOT NULL,
                user_id TEXT NOT NULL,
                stars INTEGER NOT NULL CHECK (stars BETWEEN 1 AND 5),
                spam INTEGER NOT NULL DEFAULT 0,
                misleading INTEGER NOT NULL DEFAULT 0,
                scam INTEGER NOT NULL DEFAULT 0,
                processed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ratings_fingerprint ON ratings(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_ratings_unprocessed ON ratings(processed, fingerprint);
            CREATE INDEX IF NOT EXISTS idx_ratings_cooldown ON ratings(fingerprint, user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_ratings_domain ON ratings(domain);

            -- Aggregated per-URL stats
            CREATE TABLE IF NOT EXISTS url_stats (
                fingerprint TEXT PRIMARY KEY,
                domain TEXT,
                content_type TEXT NOT NULL DEFAULT 'general',
                rating_count INTEGER NOT NULL DEFAULT 0,
                avg_rating REAL NOT NULL DEFAULT 0,
                spam_count INTEGER NOT NULL DEFAULT 0,
                misleading_count INTEGER NOT NULL DEFAULT 0,
                scam_count INTEGER NOT NULL DEFAULT 0,
                community_score REAL NOT NULL DEFAULT 50,
                domain_score REAL NOT NULL DEFAULT 50,
                final_score REAL NOT NULL DEFAULT 50,
                processing_status TEXT NOT NULL DEFAULT 'community_only',
                domain_analysis_processed INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_url_stats_domain ON url_stats(domain);
            CREATE INDEX IF NOT EXISTS idx_url_stats_updated ON url_stats(last_updated);

            -- Domain reputation cache
            CREATE TABLE IF NOT EXISTS domain_cache (
                domain TEXT PRIMARY KEY,
                domain_age_days INTEGER,
                ssl_valid INTEGER,
                http_status INTEGER,
                google_safe_browsing_status TEXT,
                hybrid_analysis_status TEXT,
                whois_data TEXT,
                threat_score REAL,
                last_checked TEXT NOT NULL,
                cache_expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_domain_cache_expiry ON domain_cache(cache_expires_at);

            -- Blacklist patterns
            CREATE TABLE IF NOT EXISTS blacklist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                blacklist_type TEXT NOT NULL,
                severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 10),
                active INTEGER NOT NULL DEFAULT 1,
                added_at TEXT NOT NULL
            );

            -- Per-domain content-type rules
            CREATE TABLE IF NOT EXISTS content_type_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL,
                content_type TEXT NOT NULL,
                url_pattern TEXT,
                trust_score_modifier INTEGER NOT NULL CHECK (trust_score_modifier BETWEEN -10 AND 10),
                min_ratings_required INTEGER NOT NULL CHECK (min_ratings_required BETWEEN 1 AND 10),
                active INTEGER NOT NULL DEFAULT 1,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rules_domain ON content_type_rules(domain, active);

            -- Runtime configuration overrides
            CREATE TABLE IF NOT EXISTS trust_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;

        debug!("SQLite schema initialized");
        Ok(())
    }

    // =========================================================================
    // Rating Log Operations
    // =========================================================================

    /// Append a rating. Fails with [`DbError::Cooldown`] when the same user
    /// already rated the same fingerprint within the last 24 hours. The check
    /// and the insert happen in one transaction.
    pub fn append_rating(&self, rating: &Rating) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let cutoff = rating.created_at - Duration::hours(24);
        let recent: bool = tx.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM ratings
                 WHERE fingerprint = ?1 AND user_id = ?2 AND created_at > ?3
             )",
            params![rating.fingerprint, rating.user_id, ts(cutoff)],
            |row| row.get(0),
        )?;
        if recent {
            return Err(DbError::Cooldown);
        }

        tx.execute(
            "INSERT INTO ratings
                 (fingerprint, url, domain, user_id, stars, spam, misleading, scam, processed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            params![
                rating.fingerprint,
                rating.url,
                rating.domain,
                rating.user_id,
                rating.stars,
                rating.spam,
                rating.misleading,
                rating.scam,
                ts(rating.created_at),
            ],
        )?;
        tx.commit()?;

        debug!("Appended rating for {}", rating.fingerprint);
        Ok(())
    }

    /// Fingerprints with at least one unprocessed rating, oldest first.
    pub fn list_unprocessed_fingerprints(&self, limit: u32) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint FROM ratings
             WHERE processed = 0
             GROUP BY fingerprint
             ORDER BY MIN(id)
             LIMIT ?1",
        )?;
        let fingerprints = stmt
            .query_map(params![limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(fingerprints)
    }

    /// How many fingerprints still have unprocessed ratings.
    pub fn count_unprocessed_fingerprints(&self) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT fingerprint) FROM ratings WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// All retained ratings for one fingerprint.
    pub fn ratings_for_fingerprint(&self, fingerprint: &str) -> Result<Vec<Rating>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT fingerprint, url, domain, user_id, stars, spam, misleading, scam, processed, created_at
             FROM ratings WHERE fingerprint = ?1 ORDER BY id",
        )?;
        let ratings = stmt
            .query_map(params![fingerprint], |row| {
                Ok(Rating {
                    fingerprint: row.get(0)?,
                    url: row.get(1)?,
                    domain: row.get(2)?,
                    user_id: row.get(3)?,
                    stars: row.get(4)?,
                    spam: row.get(5)?,
                    misleading: row.get(6)?,
                    scam: row.get(7)?,
                    processed: row.get(8)?,
                    created_at: parse_ts(9, row.get(9)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    /// Count, average stars, and flag totals over the retained log for one
    /// fingerprint.
    pub fn rating_aggregates(&self, fingerprint: &str) -> Result<RatingAggregates, DbError> {
        let conn = self.conn()?;
        let aggregates = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(AVG(stars), 0.0),
                    COALESCE(SUM(spam), 0),
                    COALESCE(SUM(misleading), 0),
                    COALESCE(SUM(scam), 0)
             FROM ratings WHERE fingerprint = ?1",
            params![fingerprint],
            |row| {
                Ok(RatingAggregates {
                    rating_count: row.get(0)?,
                    avg_rating: row.get(1)?,
                    spam_count: row.get(2)?,
                    misleading_count: row.get(3)?,
                    scam_count: row.get(4)?,
                })
            },
        )?;
        Ok(aggregates)
    }

    /// Mark every rating of the given fingerprints processed. Idempotent.
    pub fn mark_processed(&self, fingerprints: &[String]) -> Result<usize, DbError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE ratings SET processed = 1 WHERE fingerprint = ?1 AND processed = 0")?;
            for fingerprint in fingerprints {
                changed += stmt.execute(params![fingerprint])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Delete processed ratings past the retention window. Never touches
    /// unprocessed rows.
    pub fn delete_processed_older_than(&self, days: i64) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let cutoff = Utc::now() - Duration::days(days);
        let deleted = conn.execute(
            "DELETE FROM ratings WHERE processed = 1 AND created_at < ?1",
            params![ts(cutoff)],
        )?;
        Ok(deleted)
    }

    // =========================================================================
    // URL Stats Operations
    // =========================================================================

    pub fn get_url_stats(&self, fingerprint: &str) -> Result<Option<UrlStats>, DbError> {
        let conn = self.conn()?;
        let stats = conn
            .query_row(
                "SELECT fingerprint, domain, content_type, rating_count, avg_rating,
                        spam_count, misleading_count, scam_count,
                        community_score, domain_score, final_score,
                        processing_status, domain_analysis_processed, last_updated
                 FROM url_stats WHERE fingerprint = ?1",
                params![fingerprint],
                Self::map_url_stats,
            )
            .optional()?;
        Ok(stats)
    }

    /// Atomic upsert on the fingerprint key. All score and count fields are
    /// replaced; a `None` domain preserves whatever is already stored.
    pub fn upsert_url_stats(&self, stats: &UrlStats) -> Result<(), DbError> {
        let conn = self.conn()?;
        execute_with_retry(
            &conn,
            "INSERT INTO url_stats
                 (fingerprint, domain, content_type, rating_count, avg_rating,
                  spam_count, misleading_count, scam_count,
                  community_score, domain_score, final_score,
                  processing_status, domain_analysis_processed, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(fingerprint) DO UPDATE SET
                 domain = COALESCE(excluded.domain, url_stats.domain),
                 content_type = excluded.content_type,
                 rating_count = excluded.rating_count,
                 avg_rating = excluded.avg_rating,
                 spam_count = excluded.spam_count,
                 misleading_count = excluded.misleading_count,
                 scam_count = excluded.scam_count,
                 community_score = excluded.community_score,
                 domain_score = excluded.domain_score,
                 final_score = excluded.final_score,
                 processing_status = excluded.processing_status,
                 domain_analysis_processed = excluded.domain_analysis_processed,
                 last_updated = excluded.last_updated",
            params![
                stats.fingerprint,
                stats.domain,
                stats.content_type,
                stats.rating_count,
                stats.avg_rating,
                stats.spam_count,
                stats.misleading_count,
                stats.scam_count,
                stats.community_score,
                stats.domain_score,
                stats.final_score,
                stats.processing_status.as_str(),
                stats.domain_analysis_processed,
                ts(stats.last_updated),
            ],
        )?;
        Ok(())
    }

    /// Sweep stats rows idle since before the cutoff.
    pub fn delete_url_stats_idle_since(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM url_stats WHERE last_updated < ?1",
            params![ts(cutoff)],
        )?;
        Ok(deleted)
    }

    fn map_url_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<UrlStats> {
        let status: String = row.get(11)?;
        Ok(UrlStats {
            fingerprint: row.get(0)?,
            domain: row.get(1)?,
            content_type: row.get(2)?,
            rating_count: row.get(3)?,
            avg_rating: row.get(4)?,
            spam_count: row.get(5)?,
            misleading_count: row.get(6)?,
            scam_count: row.get(7)?,
            community_score: row.get(8)?,
            domain_score: row.get(9)?,
            final_score: row.get(10)?,
            processing_status: ProcessingStatus::parse(&status)
                .unwrap_or(ProcessingStatus::CommunityOnly),
            domain_analysis_processed: row.get(12)?,
            last_updated: parse_ts(13, row.get(13)?)?,
        })
    }

    // =========================================================================
    // Domain Cache Operations
    // =========================================================================

    /// Cheap probe: does an entry exist, and is it still inside its TTL?
    pub fn check_domain_exists(&self, domain: &str) -> Result<DomainCachePresence, DbError> {
        let conn = self.conn()?;
        let expires: Option<String> = conn
            .query_row(
                "SELECT cache_expires_at FROM domain_cache WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;

        match expires {
            None => Ok(DomainCachePresence {
                exists: false,
                valid: false,
            }),
            Some(expiry) => Ok(DomainCachePresence {
                exists: true,
                valid: expiry > ts(Utc::now()),
            }),
        }
    }

    /// Full entry, whether valid or expired. Callers decide what an expired
    /// entry is worth.
    pub fn get_domain_entry(&self, domain: &str) -> Result<Option<DomainCacheEntry>, DbError> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT domain, domain_age_days, ssl_valid, http_status,
                        google_safe_browsing_status, hybrid_analysis_status,
                        whois_data, threat_score, last_checked, cache_expires_at
                 FROM domain_cache WHERE domain = ?1",
                params![domain],
                |row| {
                    let gsb: Option<String> = row.get(4)?;
                    let hybrid: Option<String> = row.get(5)?;
                    let whois: Option<String> = row.get(6)?;
                    let http_status: Option<i64> = row.get(3)?;
                    Ok(DomainCacheEntry {
                        domain: row.get(0)?,
                        domain_age_days: row.get(1)?,
                        ssl_valid: row.get(2)?,
                        http_status: http_status.map(|s| s as u16),
                        google_safe_browsing_status: gsb
                            .as_deref()
                            .and_then(SafeBrowsingStatus::parse),
                        hybrid_analysis_status: hybrid
                            .as_deref()
                            .and_then(HybridAnalysisStatus::parse),
                        whois_data: whois.and_then(|w| serde_json::from_str(&w).ok()),
                        threat_score: row.get(7)?,
                        last_checked: parse_ts(8, row.get(8)?)?,
                        cache_expires_at: parse_ts(9, row.get(9)?)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Conflict-safe upsert on the domain key. All signal fields are replaced
    /// in one statement; `last_checked` is stamped now and `cache_expires_at`
    /// exactly `ttl_days` later. Never raises on duplicate keys.
    pub fn upsert_domain_safe(
        &self,
        update: &DomainUpdate,
        ttl_days: i64,
    ) -> Result<DomainCacheEntry, DbError> {
        let conn = self.conn()?;
        let last_checked = Utc::now();
        let cache_expires_at = last_checked + Duration::days(ttl_days);

        execute_with_retry(
            &conn,
            "INSERT INTO domain_cache
                 (domain, domain_age_days, ssl_valid, http_status,
                  google_safe_browsing_status, hybrid_analysis_status,
                  whois_data, threat_score, last_checked, cache_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(domain) DO UPDATE SET
                 domain_age_days = excluded.domain_age_days,
                 ssl_valid = excluded.ssl_valid,
                 http_status = excluded.http_status,
                 google_safe_browsing_status = excluded.google_safe_browsing_status,
                 hybrid_analysis_status = excluded.hybrid_analysis_status,
                 whois_data = excluded.whois_data,
                 threat_score = excluded.threat_score,
                 last_checked = excluded.last_checked,
                 cache_expires_at = excluded.cache_expires_at",
            params![
                update.domain,
                update.domain_age_days,
                update.ssl_valid,
                update.http_status.map(|s| s as i64),
                update.google_safe_browsing_status.map(|s| s.as_str()),
                update.hybrid_analysis_status.map(|s| s.as_str()),
                update.whois_data.as_ref().map(|w| w.to_string()),
                update.threat_score,
                ts(last_checked),
                ts(cache_expires_at),
            ],
        )?;

        Ok(DomainCacheEntry {
            domain: update.domain.clone(),
            domain_age_days: update.domain_age_days,
            ssl_valid: update.ssl_valid,
            http_status: update.http_status,
            google_safe_browsing_status: update.google_safe_browsing_status,
            hybrid_analysis_status: update.hybrid_analysis_status,
            whois_data: update.whois_data.clone(),
            threat_score: update.threat_score,
            last_checked,
            cache_expires_at,
        })
    }

    /// Domains whose entries expire before the horizon, soonest first.
    pub fn domains_expiring_before(
        &self,
        horizon: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain FROM domain_cache
             WHERE cache_expires_at < ?1
             ORDER BY cache_expires_at
             LIMIT ?2",
        )?;
        let domains = stmt
            .query_map(params![ts(horizon), limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(domains)
    }

    /// Janitor: drop entries whose expiry is older than the cutoff.
    pub fn delete_domains_expired_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM domain_cache WHERE cache_expires_at < ?1",
            params![ts(cutoff)],
        )?;
        Ok(deleted)
    }

    // =========================================================================
    // Blacklist Operations
    // =========================================================================

    /// Insert a pattern; existing patterns are left untouched.
    pub fn insert_blacklist_pattern(&self, entry: &BlacklistEntry) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO blacklist (pattern, blacklist_type, severity, active, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.pattern,
                entry.blacklist_type,
                entry.severity,
                entry.active,
                ts(entry.added_at),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Match a domain against active patterns: exact equality or SQL LIKE.
    /// Penalty is `min(sum(severity) * 5, 50)`; worst type is the pattern
    /// with the highest severity.
    pub fn check_domain_blacklist(&self, domain: &str) -> Result<BlacklistVerdict, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT blacklist_type, severity FROM blacklist
             WHERE active = 1 AND (pattern = ?1 OR ?1 LIKE pattern)",
        )?;
        let matches = stmt
            .query_map(params![domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u8>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if matches.is_empty() {
            return Ok(BlacklistVerdict::clear());
        }

        let severity_sum: u32 = matches.iter().map(|(_, s)| *s as u32).sum();
        let (worst_type, max_severity) = matches
            .iter()
            .max_by_key(|(_, s)| *s)
            .map(|(t, s)| (t.clone(), *s))
            .unwrap_or_default();

        Ok(BlacklistVerdict {
            is_blacklisted: true,
            worst_type: Some(worst_type),
            max_severity,
            penalty: ((severity_sum * 5) as f64).min(50.0),
        })
    }

    // =========================================================================
    // Content-Type Rule Operations
    // =========================================================================

    pub fn insert_content_type_rule(&self, rule: &NewContentTypeRule) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO content_type_rules
                 (domain, content_type, url_pattern, trust_score_modifier,
                  min_ratings_required, active, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                rule.domain,
                rule.content_type,
                rule.url_pattern,
                rule.trust_score_modifier,
                rule.min_ratings_required,
                rule.description,
                ts(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// First active rule for the domain whose pattern is null or appears in
    /// the URL wins; insertion order decides ties. Falls back to `general`.
    pub fn determine_content_type(&self, url: &str, domain: &str) -> Result<String, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT content_type, url_pattern FROM content_type_rules
             WHERE domain = ?1 AND active = 1
             ORDER BY id",
        )?;
        let rules = stmt
            .query_map(params![domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (content_type, pattern) in rules {
            match pattern {
                None => return Ok(content_type),
                Some(p) if url.contains(&p) => return Ok(content_type),
                Some(_) => {}
            }
        }
        Ok("general".to_string())
    }

    /// Modifier from the first active rule matching domain and content type
    /// whose rating threshold is met; 0 when nothing matches.
    pub fn lookup_modifier(
        &self,
        domain: &str,
        content_type: &str,
        rating_count: u64,
    ) -> Result<i32, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT trust_score_modifier, min_ratings_required FROM content_type_rules
             WHERE domain = ?1 AND content_type = ?2 AND active = 1
             ORDER BY id",
        )?;
        let rules = stmt
            .query_map(params![domain, content_type], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, u32>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (modifier, min_ratings) in rules {
            if rating_count >= min_ratings as u64 {
                return Ok(modifier);
            }
        }
        Ok(0)
    }

    pub fn has_active_rule(&self, domain: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT 1 FROM content_type_rules WHERE domain = ?1 AND active = 1")?;
        Ok(stmt.exists(params![domain])?)
    }

    /// Domains the rule learner should look at: enough ratings, no active
    /// rule yet. Busiest domains first.
    pub fn rule_candidate_domains(
        &self,
        min_ratings: u64,
        limit: u32,
    ) -> Result<Vec<DomainRatingStats>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*),
                    COALESCE(SUM(spam), 0), COALESCE(SUM(misleading), 0), COALESCE(SUM(scam), 0)
             FROM ratings
             WHERE domain NOT IN (SELECT domain FROM content_type_rules WHERE active = 1)
             GROUP BY domain
             HAVING COUNT(*) >= ?1
             ORDER BY COUNT(*) DESC, domain
             LIMIT ?2",
        )?;
        let candidates = stmt
            .query_map(params![min_ratings, limit], |row| {
                Ok(DomainRatingStats {
                    domain: row.get(0)?,
                    rating_count: row.get(1)?,
                    spam_count: row.get(2)?,
                    misleading_count: row.get(3)?,
                    scam_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    /// Distinct rated URLs for a domain, oldest first.
    pub fn sample_urls_for_domain(&self, domain: &str, limit: u32) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT url FROM ratings WHERE domain = ?1 GROUP BY url ORDER BY MIN(id) LIMIT ?2",
        )?;
        let urls = stmt
            .query_map(params![domain, limit], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    // =========================================================================
    // Trust Config Operations
    // =========================================================================

    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO trust_config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn get_config_value(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM trust_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Numeric override with a fallback when the key is absent or malformed.
    pub fn get_config_u64(&self, key: &str, default: u64) -> Result<u64, DbError> {
        Ok(self
            .get_config_value(key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    pub fn cache_statistics(&self) -> Result<CacheStatistics, DbError> {
        let conn = self.conn()?;
        let now = ts(Utc::now());

        let url_stats_rows: u64 =
            conn.query_row("SELECT COUNT(*) FROM url_stats", [], |r| r.get(0))?;
        let domain_cache_rows: u64 =
            conn.query_row("SELECT COUNT(*) FROM domain_cache", [], |r| r.get(0))?;
        let domain_cache_valid: u64 = conn.query_row(
            "SELECT COUNT(*) FROM domain_cache WHERE cache_expires_at > ?1",
            params![now],
            |r| r.get(0),
        )?;
        let blacklist_patterns: u64 =
            conn.query_row("SELECT COUNT(*) FROM blacklist WHERE active = 1", [], |r| {
                r.get(0)
            })?;
        let active_content_type_rules: u64 = conn.query_row(
            "SELECT COUNT(*) FROM content_type_rules WHERE active = 1",
            [],
            |r| r.get(0),
        )?;
        let total_ratings: u64 = conn.query_row("SELECT COUNT(*) FROM ratings", [], |r| r.get(0))?;
        let unprocessed_ratings: u64 = conn.query_row(
            "SELECT COUNT(*) FROM ratings WHERE processed = 0",
            [],
            |r| r.get(0),
        )?;

        Ok(CacheStatistics {
            url_stats_rows,
            domain_cache_rows,
            domain_cache_valid,
            blacklist_patterns,
            active_content_type_rules,
            total_ratings,
            unprocessed_ratings,
        })
    }
}
