//! wikiseek-rank - Scoring policy and deduplication
//!
//! Converts raw cosine similarities into domain-aware ranking scores and
//! collapses near-duplicate results.
//!
//! # Scoring
//!
//! [`ScoringPolicy`] applies a fixed sequence of independent multiplicative
//! adjustments (authoritative-page, topic-relevance, comprehensiveness,
//! content-quality, granularity preference, exact-title-match). Every
//! multiplier is strictly positive, so a boosted score keeps the sign of
//! the base similarity. Scoring is a pure function over a query context and
//! a chunk; the heuristic tables live in `RankingConfig`.
//!
//! # Deduplication
//!
//! [`Deduplicator`] merges results whose content hash and normalized title
//! coincide (redirect aliases surfacing the same passage), accumulating the
//! merged page titles as aliases and always keeping the highest-scoring
//! representative.

mod dedup;
mod policy;

pub use dedup::Deduplicator;
pub use policy::{sort_and_rank, Adjustment, QueryContext, ScoringPolicy};

// Re-export for convenience
pub use wikiseek_core::{DedupConfig, RankingConfig, SearchResult};
