//! Trustline persistence layer
//!
//! All relational state behind the scoring pipeline:
//! - Rating log (append-only, 7-day retention)
//! - Aggregated URL stats
//! - Domain reputation cache with TTLs
//! - Blacklist patterns and content-type rules
//! - Runtime trust-config key/value overrides

pub mod error;
pub mod models;
pub mod sqlite;

pub use error::DbError;
pub use models::{
    BlacklistEntry, CacheStatistics, DomainCacheEntry, DomainCachePresence, DomainRatingStats,
    DomainUpdate, NewContentTypeRule, Rating, UrlStats,
};
pub use sqlite::TrustDb;
