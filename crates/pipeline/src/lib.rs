//! Trustline background pipeline
//!
//! The workers that turn the raw rating log into served trust scores:
//! - [`aggregator::Aggregator`] consumes unprocessed ratings into URL stats
//! - [`rule_learner::RuleLearner`] mines per-domain content-type rules
//! - [`janitor::Janitor`] enforces retention windows
//! - [`scheduler::Scheduler`] drives all of them on fixed intervals

pub mod aggregator;
pub mod janitor;
pub mod rule_learner;
pub mod scheduler;

pub use aggregator::{Aggregator, TickReport};
pub use janitor::Janitor;
pub use rule_learner::{LearnReport, RuleLearner};
pub use scheduler::{JobHealth, Scheduler};
