//! Content-type rule learning
//!
//! Daily worker that turns rating history into per-domain content-type
//! rules. Detection is a fixed decision list: a known-domain table first,
//! then URL-pattern inspection over a handful of sample URLs, otherwise
//! `general`. The community's report flags tighten the learned rule.

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use trustline_db::{DbError, DomainRatingStats, NewContentTypeRule, TrustDb};

/// Ratings a domain needs before it is worth a rule.
const MIN_RATINGS_FOR_RULE: u64 = 3;
/// Sample URLs inspected per domain.
const SAMPLE_URL_LIMIT: u32 = 5;
/// Every learned rule starts from this rating threshold.
const BASE_MIN_RATINGS: u32 = 3;

/// Domains whose content type is known a priori.
const KNOWN_DOMAINS: &[(&str, &str)] = &[
    ("youtube.com", "video"),
    ("vimeo.com", "video"),
    ("twitch.tv", "video"),
    ("dailymotion.com", "video"),
    ("facebook.com", "social"),
    ("twitter.com", "social"),
    ("x.com", "social"),
    ("instagram.com", "social"),
    ("reddit.com", "social"),
    ("tiktok.com", "social"),
    ("github.com", "code"),
    ("gitlab.com", "code"),
    ("bitbucket.org", "code"),
    ("stackoverflow.com", "code"),
    ("cnn.com", "news"),
    ("bbc.com", "news"),
    ("bbc.co.uk", "news"),
    ("nytimes.com", "news"),
    ("reuters.com", "news"),
    ("theguardian.com", "news"),
    ("wikipedia.org", "education"),
    ("coursera.org", "education"),
    ("khanacademy.org", "education"),
    ("edx.org", "education"),
    ("udemy.com", "education"),
    ("amazon.com", "ecommerce"),
    ("ebay.com", "ecommerce"),
    ("etsy.com", "ecommerce"),
    ("aliexpress.com", "ecommerce"),
    ("walmart.com", "ecommerce"),
    ("docs.rs", "docs"),
    ("readthedocs.io", "docs"),
    ("developer.mozilla.org", "docs"),
    ("linkedin.com", "professional"),
    ("glassdoor.com", "professional"),
    ("indeed.com", "professional"),
    ("spotify.com", "entertainment"),
    ("soundcloud.com", "entertainment"),
    ("imdb.com", "entertainment"),
    ("netflix.com", "entertainment"),
];

/// URL shapes checked against sample URLs, in priority order. The stored
/// token is what the rule keeps as its `url_pattern`.
const URL_PATTERNS: &[(&str, &str, &str)] = &[
    ("video", r"/watch|/video/|/v/|\.mp4", "/watch"),
    ("article", r"/article|/blog|/post/|/news/|/story", "/article"),
    ("product", r"/product|/item/|/dp/|/shop", "/product"),
];

/// Starting modifier per detected content type, before community
/// adjustments.
fn base_modifier(content_type: &str) -> i32 {
    match content_type {
        "code" | "docs" | "education" => 3,
        "article" | "news" | "professional" => 2,
        "video" => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LearnReport {
    pub candidates: usize,
    pub rules_inserted: u32,
    pub failed: u32,
}

impl fmt::Display for LearnReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} candidate domains, {} rules inserted, {} failed",
            self.candidates, self.rules_inserted, self.failed
        )
    }
}

/// The rule learning worker.
pub struct RuleLearner {
    db: Arc<TrustDb>,
    batch_limit: u32,
}

impl RuleLearner {
    pub fn new(db: Arc<TrustDb>, batch_limit: u32) -> Self {
        Self { db, batch_limit }
    }

    /// One learning run over domains with enough ratings and no active rule.
    /// Per-domain failures do not abort the batch.
    pub fn run(&self) -> Result<LearnReport, DbError> {
        let candidates = self
            .db
            .rule_candidate_domains(MIN_RATINGS_FOR_RULE, self.batch_limit)?;

        let mut report = LearnReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        for candidate in &candidates {
            match self.learn_rule(candidate) {
                Ok(rule) => {
                    report.rules_inserted += 1;
                    info!(
                        "Learned rule for {}: {} (modifier {}, min ratings {})",
                        candidate.domain,
                        rule.content_type,
                        rule.trust_score_modifier,
                        rule.min_ratings_required
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Rule learning failed for {}: {}", candidate.domain, e);
                }
            }
        }

        info!("Rule learner run: {}", report);
        Ok(report)
    }

    fn learn_rule(&self, stats: &DomainRatingStats) -> Result<NewContentTypeRule, DbError> {
        let (content_type, url_pattern) = self.detect_content_type(&stats.domain)?;
        let (modifier, min_ratings) = community_adjusted(base_modifier(&content_type), stats);

        let rule = NewContentTypeRule {
            domain: stats.domain.clone(),
            content_type,
            url_pattern,
            trust_score_modifier: modifier,
            min_ratings_required: min_ratings,
            description: format!("Learned from {} ratings", stats.rating_count),
        };
        self.db.insert_content_type_rule(&rule)?;
        Ok(rule)
    }

    /// Fixed decision list: known-domain table, URL samples, then `general`.
    fn detect_content_type(&self, domain: &str) -> Result<(String, Option<String>), DbError> {
        if let Some(content_type) = known_domain_content_type(domain) {
            return Ok((content_type.to_string(), None));
        }

        let samples = self.db.sample_urls_for_domain(domain, SAMPLE_URL_LIMIT)?;
        if let Some((content_type, token)) = detect_from_urls(&samples) {
            return Ok((content_type.to_string(), Some(token.to_string())));
        }

        Ok(("general".to_string(), None))
    }
}

fn known_domain_content_type(domain: &str) -> Option<&'static str> {
    KNOWN_DOMAINS.iter().find_map(|(known, content_type)| {
        (domain == *known || domain.ends_with(&format!(".{known}"))).then_some(*content_type)
    })
}

/// The pattern matching the most sample URLs wins; listed order breaks ties.
fn detect_from_urls(urls: &[String]) -> Option<(&'static str, &'static str)> {
    let mut best: Option<(&'static str, &'static str, usize)> = None;

    for (content_type, pattern, token) in URL_PATTERNS {
        let hits = Regex::new(pattern)
            .map(|re| urls.iter().filter(|url| re.is_match(url)).count())
            .unwrap_or(0);
        if hits > 0 && best.map_or(true, |(_, _, b)| hits > b) {
            best = Some((content_type, token, hits));
        }
    }

    best.map(|(content_type, token, _)| (content_type, token))
}

/// Spam, misleading, and scam ratios tighten the rule: lower modifier,
/// higher rating threshold. Clamped to the schema ranges.
fn community_adjusted(base: i32, stats: &DomainRatingStats) -> (i32, u32) {
    let n = stats.rating_count as f64;
    let mut modifier = base;
    let mut min_ratings = BASE_MIN_RATINGS as i64;

    if stats.spam_count as f64 / n > 0.3 {
        modifier -= 5;
        min_ratings += 2;
    }
    if stats.misleading_count as f64 / n > 0.2 {
        modifier -= 3;
        min_ratings += 1;
    }
    if stats.scam_count as f64 / n > 0.1 {
        modifier -= 8;
        min_ratings += 3;
    }

    (modifier.clamp(-10, 10), min_ratings.clamp(1, 10) as u32)
}
