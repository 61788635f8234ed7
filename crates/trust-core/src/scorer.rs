//! The trust scorer
//!
//! Pure function from community aggregates, domain reputation signals,
//! blacklist verdicts, and content-type modifiers to a 0-100 trust score.
//! All I/O happens in the callers; identical inputs always produce
//! identical outputs.

use crate::types::{
    BlacklistVerdict, DomainSignals, HybridAnalysisStatus, RatingAggregates, SafeBrowsingStatus,
};

/// Score assigned when no signal argues either way.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Weight of the domain component in the fused score.
pub const DOMAIN_WEIGHT: f64 = 0.4;
/// Weight of the community component in the fused score.
pub const COMMUNITY_WEIGHT: f64 = 0.6;

/// Per-rating penalty weights for the report flags.
const SPAM_WEIGHT: f64 = 30.0;
const MISLEADING_WEIGHT: f64 = 25.0;
const SCAM_WEIGHT: f64 = 40.0;

/// Rating count at which the community score gets full confidence.
const FULL_CONFIDENCE_COUNT: f64 = 5.0;

/// Everything the scorer consumes for one URL.
#[derive(Debug, Clone, Default)]
pub struct ScoreInputs {
    pub ratings: RatingAggregates,
    /// Signals from a valid domain cache entry; `None` when the cache entry
    /// is missing or expired.
    pub domain_signals: Option<DomainSignals>,
    pub blacklist: BlacklistVerdict,
    pub content_type: String,
    pub content_type_modifier: i32,
}

/// Scorer output for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub community_score: f64,
    pub domain_score: f64,
    pub final_score: f64,
    pub content_type: String,
}

/// Compute all three scores for one URL.
pub fn score(inputs: ScoreInputs) -> ScoreBreakdown {
    let community = community_score(&inputs.ratings);
    let domain = domain_score(
        inputs.domain_signals.as_ref(),
        &inputs.blacklist,
        inputs.content_type_modifier,
    );
    let final_score = fuse(domain, community);

    ScoreBreakdown {
        community_score: round2(community),
        domain_score: round2(domain),
        final_score,
        content_type: inputs.content_type,
    }
}

/// Community component: average stars mapped to 0-100, report-flag
/// penalties subtracted, then blended toward 50 by sample confidence.
pub fn community_score(agg: &RatingAggregates) -> f64 {
    if agg.rating_count == 0 {
        return NEUTRAL_SCORE;
    }

    let n = agg.rating_count as f64;
    let base = ((agg.avg_rating - 1.0) / 4.0) * 100.0;
    let penalties = SPAM_WEIGHT * (agg.spam_count as f64 / n)
        + MISLEADING_WEIGHT * (agg.misleading_count as f64 / n)
        + SCAM_WEIGHT * (agg.scam_count as f64 / n);

    let raw = base - penalties;
    let confidence = (n / FULL_CONFIDENCE_COUNT).min(1.0);
    let blended = raw * confidence + NEUTRAL_SCORE * (1.0 - confidence);

    clamp(blended)
}

/// Domain component: base 50 adjusted by reputation signals in a fixed
/// order, then blacklist penalty and content-type modifier.
///
/// `signals` must come from a *valid* cache entry; the blacklist penalty and
/// modifier apply regardless of cache state. Null signals are neutral.
pub fn domain_score(
    signals: Option<&DomainSignals>,
    blacklist: &BlacklistVerdict,
    modifier: i32,
) -> f64 {
    let mut score = NEUTRAL_SCORE;

    if let Some(sig) = signals {
        if let Some(age_days) = sig.domain_age_days {
            // Brackets measured in whole years: 2000 days is five years, not six.
            let age_years = age_days / 365;
            score += if age_years > 5 {
                15.0
            } else if age_years > 2 {
                10.0
            } else if age_years > 1 {
                5.0
            } else if age_days < 30 {
                -10.0
            } else {
                0.0
            };
        }

        match sig.ssl_valid {
            Some(true) => score += 5.0,
            Some(false) => score -= 15.0,
            None => {}
        }

        if let Some(status) = sig.http_status {
            if status >= 400 {
                score -= 20.0;
            }
        }

        match sig.safe_browsing {
            Some(SafeBrowsingStatus::Malware) => score -= 50.0,
            Some(SafeBrowsingStatus::Phishing) => score -= 45.0,
            Some(SafeBrowsingStatus::Unwanted) => score -= 30.0,
            Some(SafeBrowsingStatus::Clean) | None => {}
        }

        match sig.hybrid_analysis {
            Some(HybridAnalysisStatus::Malicious) => score -= 40.0,
            Some(HybridAnalysisStatus::Suspicious) => score -= 25.0,
            Some(HybridAnalysisStatus::Clean) | None => {}
        }
    }

    score -= blacklist.penalty;
    score += modifier as f64;

    clamp(score)
}

/// Weighted fusion of the two components, clamped and rounded to two
/// decimals.
pub fn fuse(domain: f64, community: f64) -> f64 {
    round2(clamp(DOMAIN_WEIGHT * domain + COMMUNITY_WEIGHT * community))
}

fn clamp(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
