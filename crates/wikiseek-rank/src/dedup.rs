//! Alias-aware deduplication of search results.

use std::collections::HashMap;

use tracing::debug;

use wikiseek_core::{DedupConfig, SearchResult};

/// Collapses results that surface the same underlying content under
/// different page titles (redirect aliases).
///
/// The dedup key is the pair of content hash and normalized title; the
/// first occurrence of a key becomes the canonical result and later
/// collisions fold their titles into its alias list. The canonical entry
/// always carries the highest score seen for its group.
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    /// Create a deduplicator from its normalization table.
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Normalize a page title for comparison: lowercase, fold known
    /// variants, strip separators and common punctuation.
    pub fn normalize_title(&self, title: &str) -> String {
        let mut normalized = title.to_lowercase();

        for variant in &self.config.title_variants {
            normalized = normalized.replace(variant.from.as_str(), variant.to.as_str());
        }

        normalized
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect()
    }

    /// Collapse duplicates, preserving input order of canonical entries.
    ///
    /// Never increases the result count, never drops the highest-scoring
    /// member of a collision group, and is idempotent.
    pub fn dedup(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        if results.is_empty() {
            return results;
        }

        let original_count = results.len();
        let mut seen: HashMap<([u8; 32], String), usize> = HashMap::new();
        let mut deduplicated: Vec<SearchResult> = Vec::with_capacity(results.len());

        for mut result in results {
            let content_hash = *blake3::hash(result.chunk.content.trim().as_bytes()).as_bytes();
            let key = (content_hash, self.normalize_title(&result.chunk.page_title));

            match seen.get(&key) {
                None => {
                    seen.insert(key, deduplicated.len());
                    if result.aliases.is_empty() {
                        result.aliases = vec![result.chunk.page_title.clone()];
                    }
                    deduplicated.push(result);
                }
                Some(&existing_idx) => {
                    let existing = &mut deduplicated[existing_idx];

                    if !existing.aliases.contains(&result.chunk.page_title) {
                        existing.aliases.push(result.chunk.page_title.clone());
                    }

                    // Keep the higher-scoring representative, but never
                    // lose the accumulated alias list.
                    if result.score > existing.score {
                        result.aliases = std::mem::take(&mut existing.aliases);
                        *existing = result;
                    }
                }
            }
        }

        if deduplicated.len() != original_count {
            debug!(
                "Deduplication: {} -> {} results",
                original_count,
                deduplicated.len()
            );
        }

        deduplicated
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikiseek_core::{Chunk, ChunkType};

    fn result(title: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            rank: 0,
            score,
            chunk: Chunk {
                page_title: title.to_string(),
                section_path: "Intro".to_string(),
                content: content.to_string(),
                chunk_text: content.to_string(),
                url: format!("https://wiki.example.org/title/{}", title.replace(' ', "_")),
                chunk_type: ChunkType::Medium,
                section_level: 1,
            },
            original_query: "q".to_string(),
            final_query: "q".to_string(),
            aliases: vec![title.to_string()],
        }
    }

    #[test]
    fn test_normalize_title_folds_variants() {
        let dedup = Deduplicator::default();
        assert_eq!(dedup.normalize_title("Wi-Fi"), "wifi");
        assert_eq!(dedup.normalize_title("wifi"), "wifi");
        assert_eq!(dedup.normalize_title("Wireless_network"), "wirelessnetwork");
        assert_eq!(dedup.normalize_title("Wireless network"), "wirelessnetwork");
    }

    #[test]
    fn test_alias_merge() {
        let dedup = Deduplicator::default();
        let content = "Wireless networking on Linux.";
        let results = vec![
            result("Wi-Fi", content, 0.9),
            result("wifi", content, 0.7),
        ];

        let deduped = dedup.dedup(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].chunk.page_title, "Wi-Fi");
        assert_eq!(
            deduped[0].aliases,
            vec!["Wi-Fi".to_string(), "wifi".to_string()]
        );
    }

    #[test]
    fn test_higher_scoring_duplicate_replaces_but_keeps_aliases() {
        let dedup = Deduplicator::default();
        let content = "Wireless networking on Linux.";
        let results = vec![
            result("Wi-Fi", content, 0.5),
            result("wifi", content, 0.9),
        ];

        let deduped = dedup.dedup(results);
        assert_eq!(deduped.len(), 1);
        // Survivor is the max-scoring member...
        assert_eq!(deduped[0].chunk.page_title, "wifi");
        assert!((deduped[0].score - 0.9).abs() < 1e-6);
        // ...with the earlier title preserved as an alias.
        assert_eq!(
            deduped[0].aliases,
            vec!["Wi-Fi".to_string(), "wifi".to_string()]
        );
    }

    #[test]
    fn test_survivor_score_is_group_max() {
        let dedup = Deduplicator::default();
        let content = "Same passage.";
        let scores = [0.4, 0.8, 0.6];
        let results: Vec<_> = scores
            .iter()
            .map(|&s| result("Bluetooth", content, s))
            .collect();

        let deduped = dedup.dedup(results);
        assert_eq!(deduped.len(), 1);
        assert!((deduped[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_distinct_content_same_title_not_merged() {
        let dedup = Deduplicator::default();
        let results = vec![
            result("Kernel", "First section.", 0.9),
            result("Kernel", "Second section.", 0.8),
        ];
        assert_eq!(dedup.dedup(results).len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let dedup = Deduplicator::default();
        let content = "Wireless networking on Linux.";
        let results = vec![
            result("Wi-Fi", content, 0.9),
            result("wifi", content, 0.7),
            result("NetworkManager", "Managing connections.", 0.6),
        ];

        let once = dedup.dedup(results);
        let twice = dedup.dedup(once.clone());

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.chunk.page_title, b.chunk.page_title);
            assert_eq!(a.aliases, b.aliases);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_never_increases_count() {
        let dedup = Deduplicator::default();
        let results = vec![
            result("A", "one", 0.9),
            result("B", "two", 0.8),
            result("C", "three", 0.7),
        ];
        let deduped = dedup.dedup(results);
        assert_eq!(deduped.len(), 3);
    }
}
