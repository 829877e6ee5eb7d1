//! # DevMatrix Pattern Store
//!
//! Vector-searchable storage of prior successful synthesis outputs:
//!
//! - `find_similar`: ranked lookup over promoted patterns, filtered by
//!   domain and success rate
//! - `register_candidate`: idempotent-by-hash registration of successful
//!   artifacts, gated on observed precision
//! - `promote_candidates`: quorum + success-rate promotion into the
//!   queryable pool
//!
//! Patterns persist under a directory per domain tag with one artifact file
//! and one metadata JSON per signature hash; candidates live under a
//! sibling `candidates/` prefix.

pub mod persistence;
pub mod store;

pub use store::{Pattern, PatternCandidate, PatternStore, PatternStoreConfig, SuccessMetrics};
