//! SQLite-backed search-history store.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags};
use tracing::info;
use ulid::Ulid;

use wikiseek_core::{Result, SearchRecord, SearchStats, WikiseekError};

use crate::schema::SCHEMA;

/// SQLite-backed store for logged searches.
pub struct HistoryStore {
    /// Connection wrapped in a blocking Mutex; writes are rare and cheap.
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open or create a history database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| WikiseekError::history(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| WikiseekError::history(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| WikiseekError::history(format!("Failed to configure connection: {}", e)))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| WikiseekError::history(format!("Failed to initialize schema: {}", e)))?;

        info!("History database opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one search record.
    pub fn log_search(&self, record: &SearchRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| WikiseekError::history("connection lock poisoned"))?;

        conn.execute(
            r#"
            INSERT INTO searches
                (id, original_query, final_query, top_k, refined,
                 result_count, elapsed_ms, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id.to_string(),
                record.original_query,
                record.final_query,
                record.top_k,
                record.refined as i64,
                record.result_count,
                record.elapsed_ms as i64,
                record.timestamp as i64,
            ],
        )
        .map_err(|e| WikiseekError::history(format!("Failed to log search: {}", e)))?;

        Ok(())
    }

    /// Most recent searches, newest first.
    pub fn recent_searches(&self, limit: usize) -> Result<Vec<SearchRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| WikiseekError::history("connection lock poisoned"))?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, original_query, final_query, top_k, refined,
                       result_count, elapsed_ms, timestamp
                FROM searches
                ORDER BY timestamp DESC, id DESC
                LIMIT ?1
                "#,
            )
            .map_err(|e| WikiseekError::history(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(|e| WikiseekError::history(format!("Failed to query history: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, original_query, final_query, top_k, refined, result_count, elapsed_ms, timestamp) =
                row.map_err(|e| WikiseekError::history(format!("Failed to read row: {}", e)))?;

            let id = Ulid::from_str(&id)
                .map_err(|e| WikiseekError::history(format!("Invalid record id: {}", e)))?;

            records.push(SearchRecord {
                id,
                original_query,
                final_query,
                top_k,
                refined: refined != 0,
                result_count,
                elapsed_ms: elapsed_ms as u64,
                timestamp: timestamp as u64,
            });
        }

        Ok(records)
    }

    /// Aggregate statistics over all logged searches.
    pub fn search_stats(&self) -> Result<SearchStats> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| WikiseekError::history("connection lock poisoned"))?;

        conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(AVG(elapsed_ms), 0.0),
                   COALESCE(SUM(refined), 0),
                   MAX(timestamp)
            FROM searches
            "#,
            [],
            |row| {
                Ok(SearchStats {
                    total_searches: row.get::<_, i64>(0)? as u64,
                    avg_elapsed_ms: row.get::<_, f64>(1)?,
                    refined_searches: row.get::<_, i64>(2)? as u64,
                    last_search: row.get::<_, Option<i64>>(3)?.map(|t| t as u64),
                })
            },
        )
        .map_err(|e| WikiseekError::history(format!("Failed to compute stats: {}", e)))
    }
}
