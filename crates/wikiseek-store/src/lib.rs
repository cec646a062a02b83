//! wikiseek-store - SQLite search-history log
//!
//! Persists one row per completed search so the CLI can show recent
//! queries and aggregate statistics. Logging failures are the caller's
//! to downgrade: a search that cannot be logged is still a successful
//! search.

mod schema;
mod sqlite;

pub use sqlite::HistoryStore;

// Re-export schema for testing/migrations
pub use schema::SCHEMA;
