//! Trustline core — URL canonicalisation, fingerprinting, and trust scoring
//!
//! Everything in this crate is pure and deterministic: no I/O, no clocks.
//! The stores and workers live in sibling crates and feed their state in
//! through the plain input structs defined here.

pub mod config;
pub mod fingerprint;
pub mod scorer;
pub mod types;

pub use config::TrustConfig;
pub use fingerprint::{canonicalize_url, extract_domain, fingerprint_url, UrlError, UrlIdentity};
pub use scorer::{score, ScoreBreakdown, ScoreInputs};
pub use types::{
    BlacklistVerdict, CacheStatus, DataSource, DomainSignals, HybridAnalysisStatus,
    ProcessingStatus, RatingAggregates, SafeBrowsingStatus,
};
