//! Core domain types for the wikiseek retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Chunk granularity level, assigned by the upstream chunker.
///
/// Every source page is split at three granularities: sub-paragraph units,
/// whole sections, and grouped top-level sections or whole pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Small,
    Medium,
    Large,
}

impl ChunkType {
    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retrievable documentation passage.
///
/// Produced upstream and consumed read-only. The field names are the wire
/// schema of the chunk corpus and the index metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Source document title.
    pub page_title: String,

    /// Human-readable hierarchical section label.
    pub section_path: String,

    /// Raw passage text (non-empty).
    pub content: String,

    /// Content prefixed with title/section context. Used only for
    /// embedding, never for display.
    pub chunk_text: String,

    /// Anchor-qualified source locator.
    pub url: String,

    /// Granularity level.
    pub chunk_type: ChunkType,

    /// Heading depth of the originating section (1-based).
    pub section_level: u32,
}

impl Chunk {
    /// Text to feed the passage-side embedder. Falls back to `content`
    /// for corpora that omit the contextualized variant.
    pub fn embedding_text(&self) -> &str {
        if self.chunk_text.is_empty() {
            &self.content
        } else {
            &self.chunk_text
        }
    }
}

/// A ranked search result. Constructed fresh per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result rank (1-indexed, assigned after the final sort).
    pub rank: u32,

    /// Cosine similarity after all boosts. May exceed [-1, 1] once boosted.
    pub score: f32,

    /// The matched chunk.
    pub chunk: Chunk,

    /// Query as the user typed it.
    pub original_query: String,

    /// Query actually searched (refined, or identical to the original).
    pub final_query: String,

    /// Page titles merged into this result by deduplication. Always
    /// contains at least the result's own title.
    pub aliases: Vec<String>,
}

/// Load state of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Loaded,
    NotLoaded,
}

/// Diagnostic statistics for a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Whether an index is currently loaded.
    pub status: IndexStatus,

    /// Number of stored vectors.
    pub total_vectors: usize,

    /// Number of chunk metadata entries (always equals `total_vectors`
    /// for a loaded index).
    pub total_chunks: usize,

    /// Embedding dimension.
    pub dimension: usize,

    /// Chunk count per granularity.
    pub chunk_types: BTreeMap<ChunkType, usize>,

    /// Hex blake3 checksum of the vector payload.
    pub checksum: Option<String>,
}

impl IndexStats {
    /// Stats for an index that has nothing loaded.
    pub fn not_loaded() -> Self {
        Self {
            status: IndexStatus::NotLoaded,
            total_vectors: 0,
            total_chunks: 0,
            dimension: 0,
            chunk_types: BTreeMap::new(),
            checksum: None,
        }
    }
}

/// One logged search, for the history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Unique identifier (ULID).
    pub id: Ulid,

    /// Query as typed.
    pub original_query: String,

    /// Query after refinement (identical when refinement was off or failed).
    pub final_query: String,

    /// Requested result count.
    pub top_k: u32,

    /// Whether refinement was requested.
    pub refined: bool,

    /// Results actually returned.
    pub result_count: u32,

    /// Wall-clock search time in milliseconds.
    pub elapsed_ms: u64,

    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl SearchRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        original_query: &str,
        final_query: &str,
        top_k: u32,
        refined: bool,
        result_count: u32,
        elapsed_ms: u64,
    ) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            id: Ulid::new(),
            original_query: original_query.to_string(),
            final_query: final_query.to_string(),
            top_k,
            refined,
            result_count,
            elapsed_ms,
            timestamp: now,
        }
    }
}

/// Aggregate statistics over the search history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStats {
    /// Total logged searches.
    pub total_searches: u64,

    /// Mean search time in milliseconds.
    pub avg_elapsed_ms: f64,

    /// Searches that requested refinement.
    pub refined_searches: u64,

    /// Unix millis of the most recent search, if any.
    pub last_search: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(title: &str, content: &str) -> Chunk {
        Chunk {
            page_title: title.to_string(),
            section_path: "Configuration".to_string(),
            content: content.to_string(),
            chunk_text: format!("{} - Configuration\n{}", title, content),
            url: format!("https://wiki.example.org/title/{}", title),
            chunk_type: ChunkType::Medium,
            section_level: 2,
        }
    }

    #[test]
    fn test_chunk_type_roundtrip() {
        let json = serde_json::to_string(&ChunkType::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
        let back: ChunkType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChunkType::Medium);
    }

    #[test]
    fn test_chunk_wire_schema() {
        let json = r#"{
            "page_title": "NetworkManager",
            "section_path": "Usage",
            "content": "Configure NetworkManager for wireless connections",
            "chunk_text": "NetworkManager - Usage\nConfigure NetworkManager",
            "url": "https://wiki.example.org/title/NetworkManager#Usage",
            "chunk_type": "medium",
            "section_level": 2
        }"#;
        let c: Chunk = serde_json::from_str(json).unwrap();
        assert_eq!(c.page_title, "NetworkManager");
        assert_eq!(c.chunk_type, ChunkType::Medium);
        assert_eq!(c.section_level, 2);
    }

    #[test]
    fn test_embedding_text_fallback() {
        let mut c = chunk("Iwd", "Use iwctl to manage wireless connections");
        assert!(c.embedding_text().starts_with("Iwd"));
        c.chunk_text.clear();
        assert_eq!(c.embedding_text(), c.content);
    }

    #[test]
    fn test_search_record_timestamps() {
        let rec = SearchRecord::new("wifi broken", "wireless troubleshooting", 5, true, 3, 42);
        assert!(rec.timestamp > 0);
        assert_eq!(rec.top_k, 5);
        assert!(rec.refined);
    }
}
