//! Database schema for the search-history store.

/// History schema. `refined` is stored as 0/1.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS searches (
    id TEXT PRIMARY KEY,
    original_query TEXT NOT NULL,
    final_query TEXT NOT NULL,
    top_k INTEGER NOT NULL,
    refined INTEGER NOT NULL,
    result_count INTEGER NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_searches_timestamp
    ON searches(timestamp DESC);
"#;
