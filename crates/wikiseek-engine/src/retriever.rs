//! The retrieval engine: end-to-end search orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use ulid::Ulid;

use wikiseek_core::{
    Chunk, Embedder, IndexStats, QueryRefiner, Result, SearchResult, WikiseekConfig, WikiseekError,
};
use wikiseek_index::{l2_normalize, IndexHandle, VectorIndex};
use wikiseek_rank::{sort_and_rank, Deduplicator, ScoringPolicy};

/// Per-search options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results to return.
    pub top_k: usize,

    /// Whether to rewrite the query through the refiner first.
    pub refine: bool,

    /// Log the original/refined query pair when refinement changes it.
    pub show_refinement: bool,

    /// Whether to collapse near-duplicate results.
    pub dedup: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            refine: false,
            show_refinement: false,
            dedup: true,
        }
    }
}

/// Retrieval engine over a vector index, an embedding capability, and a
/// query-refinement capability.
///
/// The index and both model handles are loaded once and shared read-only
/// across requests; the only per-request state is the transient result
/// list. Index rebuilds are copy-and-swap, so concurrent searches always
/// observe a consistent snapshot.
pub struct Retriever<E: ?Sized, R: ?Sized> {
    /// Embedding model handle.
    embedder: Arc<E>,

    /// Query refiner handle (passthrough when no model is configured).
    refiner: Arc<R>,

    /// Swappable active index.
    index: IndexHandle,

    /// Default location of the index artifacts.
    index_dir: PathBuf,

    /// Scoring heuristics.
    policy: ScoringPolicy,

    /// Alias-aware duplicate collapsing.
    dedup: Deduplicator,

    /// Over-fetch multiplier applied when deduplication is on.
    overfetch_factor: usize,

    /// Upper bound on `top_k`.
    max_top_k: usize,

    /// Deadline on a single refinement call.
    refine_timeout: Duration,
}

impl<E, R> Retriever<E, R>
where
    E: Embedder + ?Sized,
    R: QueryRefiner + ?Sized,
{
    /// Create an engine from configuration and its capability handles.
    /// No index is loaded yet; the first search loads from the default
    /// location.
    pub fn new(config: &WikiseekConfig, embedder: Arc<E>, refiner: Arc<R>) -> Self {
        Self {
            embedder,
            refiner,
            index: IndexHandle::empty(),
            index_dir: config.index.dir.clone(),
            policy: ScoringPolicy::new(config.ranking.clone()),
            dedup: Deduplicator::new(config.dedup.clone()),
            overfetch_factor: config.search.overfetch_factor.max(1),
            max_top_k: config.search.max_top_k,
            refine_timeout: Duration::from_secs(config.refiner.timeout_secs),
        }
    }

    /// Load index artifacts from the default directory.
    ///
    /// Returns `Ok(false)` when the artifacts are missing. Corrupt or
    /// count-mismatched artifacts are fatal errors.
    pub fn load_index(&self) -> Result<bool> {
        self.index.load(&self.index_dir)
    }

    /// Whether an index is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.index.is_loaded()
    }

    /// Replace the active index with a freshly built one (copy-and-swap).
    /// In-flight searches keep their snapshot.
    pub fn rebuild(&self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<()> {
        let index = VectorIndex::build(vectors, chunks)?;
        info!("Swapping in rebuilt index with {} chunks", index.len());
        self.index.replace(index)
    }

    /// Diagnostic statistics for the active index.
    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// End-to-end search.
    ///
    /// Deterministic for a fixed index snapshot, fixed query, and fixed
    /// refiner output. An empty result list is a valid outcome.
    pub async fn search(&self, query: &str, opts: SearchOptions) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let trace = Ulid::new();

        if query.trim().is_empty() {
            return Err(WikiseekError::invalid_argument("query must not be empty"));
        }
        if opts.top_k == 0 {
            return Err(WikiseekError::invalid_argument("top_k must be at least 1"));
        }
        let top_k = opts.top_k.min(self.max_top_k);

        self.ensure_loaded()?;

        info!("[{}] Searching for: {:?}", trace, query);

        let original_query = query.to_string();
        let final_query = if opts.refine {
            self.refine_or_fallback(query, opts.show_refinement).await
        } else {
            original_query.clone()
        };

        // Encode the (possibly refined) query. The embedder owns any
        // model prefixing; normalization here makes inner product cosine.
        let mut query_vector = self.embedder.embed_query(&final_query).await?;
        l2_normalize(&mut query_vector);

        let index = self.index.current()?;

        // Over-fetch to compensate for post-hoc duplicate collapsing.
        let fetch_k = if opts.dedup {
            top_k * self.overfetch_factor
        } else {
            top_k
        };

        let hits = index.search(&query_vector, fetch_k)?;
        debug!("[{}] Vector search returned {} candidates", trace, hits.len());

        let ctx = self.policy.context(&original_query, &final_query);

        let mut results: Vec<SearchResult> = Vec::with_capacity(hits.len());
        for (idx, similarity) in hits {
            // Defensive bound check: a candidate past the corpus is
            // dropped, never a crash.
            let chunk = match index.chunk(idx) {
                Some(c) => c.clone(),
                None => continue,
            };

            let score = self.policy.score(similarity, &ctx, &chunk);
            let page_title = chunk.page_title.clone();

            results.push(SearchResult {
                rank: 0,
                score,
                chunk,
                original_query: original_query.clone(),
                final_query: final_query.clone(),
                aliases: vec![page_title],
            });
        }

        sort_and_rank(&mut results);

        if opts.dedup {
            results = self.dedup.dedup(results);
        }

        results.truncate(top_k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i as u32 + 1;
        }

        info!(
            "[{}] Search completed in {}ms, returned {} results",
            trace,
            start.elapsed().as_millis(),
            results.len()
        );

        Ok(results)
    }

    /// Load the index on first use; surface anything unusable as a single
    /// actionable "index unavailable" condition.
    fn ensure_loaded(&self) -> Result<()> {
        if self.index.is_loaded() {
            return Ok(());
        }

        match self.index.load(&self.index_dir) {
            Ok(true) => Ok(()),
            Ok(false) => Err(WikiseekError::index_unavailable(format!(
                "no index artifacts in {}; run `wikiseek build` first",
                self.index_dir.display()
            ))),
            Err(e) => Err(WikiseekError::index_unavailable(e.to_string())),
        }
    }

    /// Run the refiner under a deadline. Any failure, timeout, or empty
    /// rewrite falls back to the original query and never reaches the
    /// caller.
    async fn refine_or_fallback(&self, query: &str, show_refinement: bool) -> String {
        let refined = tokio::time::timeout(self.refine_timeout, self.refiner.refine(query)).await;

        match refined {
            Ok(Ok(refined)) if !refined.trim().is_empty() => {
                if show_refinement && refined != query {
                    info!("Original query: {}", query);
                    info!("Refined query:  {}", refined);
                }
                refined
            }
            Ok(Ok(_)) => {
                warn!("Refiner {} returned an empty rewrite; using original query", self.refiner.name());
                query.to_string()
            }
            Ok(Err(e)) => {
                warn!("Query refinement failed: {}; using original query", e);
                query.to_string()
            }
            Err(_) => {
                warn!(
                    "Query refinement timed out after {:?}; using original query",
                    self.refine_timeout
                );
                query.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use wikiseek_core::{ChunkType, Embedder, QueryRefiner};

    /// Embedder returning hand-chosen unit vectors per exact text.
    struct FixedEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        fallback: Vec<f32>,
    }

    impl FixedEmbedder {
        fn new(entries: &[(&str, Vec<f32>)], fallback: Vec<f32>) -> Self {
            let mut vectors = HashMap::new();
            for (text, v) in entries {
                let mut v = v.clone();
                l2_normalize(&mut v);
                vectors.insert(text.to_string(), v);
            }
            let mut fallback = fallback;
            l2_normalize(&mut fallback);
            Self { vectors, fallback }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| self.vectors.get(*t).cloned().unwrap_or_else(|| self.fallback.clone()))
                .collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| self.fallback.clone()))
        }

        fn dimension(&self) -> usize {
            3
        }

        fn max_tokens(&self) -> usize {
            512
        }
    }

    struct PassthroughRefiner;

    #[async_trait]
    impl QueryRefiner for PassthroughRefiner {
        async fn refine(&self, query: &str) -> Result<String> {
            Ok(query.to_string())
        }

        fn name(&self) -> &str {
            "passthrough"
        }
    }

    struct FailingRefiner;

    #[async_trait]
    impl QueryRefiner for FailingRefiner {
        async fn refine(&self, _query: &str) -> Result<String> {
            Err(WikiseekError::refinement("model unreachable"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowRefiner;

    #[async_trait]
    impl QueryRefiner for SlowRefiner {
        async fn refine(&self, query: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(format!("{} refined", query))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn chunk(title: &str, content: &str, chunk_type: ChunkType) -> Chunk {
        Chunk {
            page_title: title.to_string(),
            section_path: "Configuration".to_string(),
            content: content.to_string(),
            chunk_text: format!("{}\n{}", title, content),
            url: format!("https://wiki.example.org/title/{}", title.replace(' ', "_")),
            chunk_type,
            section_level: 2,
        }
    }

    fn wireless_corpus() -> (Vec<Vec<f32>>, Vec<Chunk>) {
        let chunks = vec![
            chunk(
                "NetworkManager",
                "Configure NetworkManager for wireless connections",
                ChunkType::Medium,
            ),
            chunk(
                "Wireless Configuration",
                "Use iwctl to manage wireless connections",
                ChunkType::Small,
            ),
        ];
        // Query vector is [1, 0, 0]; the first chunk is the closer one.
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.8, 0.6, 0.0]];
        (vectors, chunks)
    }

    fn wireless_retriever<R>(refiner: R) -> Retriever<FixedEmbedder, R>
    where
        R: QueryRefiner + Send + Sync,
    {
        let (vectors, chunks) = wireless_corpus();
        let embedder = FixedEmbedder::new(
            &[("wireless network setup", vec![1.0, 0.0, 0.0])],
            vec![1.0, 0.0, 0.0],
        );
        let config = WikiseekConfig::default();
        let retriever = Retriever::new(&config, Arc::new(embedder), Arc::new(refiner));
        retriever.rebuild(vectors, chunks).unwrap();
        retriever
    }

    #[tokio::test]
    async fn test_wireless_scenario_ranked_by_similarity() {
        let retriever = wireless_retriever(PassthroughRefiner);
        let results = retriever
            .search(
                "wireless network setup",
                SearchOptions {
                    top_k: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.page_title, "NetworkManager");
        assert_eq!(results[1].chunk.page_title, "Wireless Configuration");
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_result_count_bounded_by_top_k() {
        let retriever = wireless_retriever(PassthroughRefiner);
        for top_k in 1..=3 {
            let results = retriever
                .search(
                    "wireless network setup",
                    SearchOptions {
                        top_k,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            assert!(results.len() <= top_k);
        }
    }

    #[tokio::test]
    async fn test_ranks_contiguous_and_descending() {
        let retriever = wireless_retriever(PassthroughRefiner);
        let results = retriever
            .search("wireless network setup", SearchOptions::default())
            .await
            .unwrap();

        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i as u32 + 1);
            if i > 0 {
                assert!(results[i - 1].score >= result.score);
            }
        }
    }

    #[tokio::test]
    async fn test_alias_dedup_scenario() {
        let content = "Wireless networking overview for laptops.";
        let chunks = vec![
            chunk("Wi-Fi", content, ChunkType::Medium),
            chunk("wifi", content, ChunkType::Medium),
        ];
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0]];

        let embedder = FixedEmbedder::new(&[], vec![1.0, 0.0, 0.0]);
        let config = WikiseekConfig::default();
        let retriever = Retriever::new(&config, Arc::new(embedder), Arc::new(PassthroughRefiner));
        retriever.rebuild(vectors, chunks).unwrap();

        let results = retriever
            .search(
                "wifi overview",
                SearchOptions {
                    top_k: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].aliases.contains(&"Wi-Fi".to_string()));
        assert!(results[0].aliases.contains(&"wifi".to_string()));
    }

    #[tokio::test]
    async fn test_dedup_disabled_keeps_duplicates() {
        let content = "Wireless networking overview for laptops.";
        let chunks = vec![
            chunk("Wi-Fi", content, ChunkType::Medium),
            chunk("wifi", content, ChunkType::Medium),
        ];
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0]];

        let embedder = FixedEmbedder::new(&[], vec![1.0, 0.0, 0.0]);
        let config = WikiseekConfig::default();
        let retriever = Retriever::new(&config, Arc::new(embedder), Arc::new(PassthroughRefiner));
        retriever.rebuild(vectors, chunks).unwrap();

        let results = retriever
            .search(
                "wifi overview",
                SearchOptions {
                    top_k: 2,
                    dedup: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_refiner_falls_back_to_original() {
        let with_refine = wireless_retriever(FailingRefiner);
        let refined_results = with_refine
            .search(
                "wireless network setup",
                SearchOptions {
                    top_k: 2,
                    refine: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let without_refine = wireless_retriever(PassthroughRefiner);
        let plain_results = without_refine
            .search(
                "wireless network setup",
                SearchOptions {
                    top_k: 2,
                    refine: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(refined_results.len(), plain_results.len());
        for (a, b) in refined_results.iter().zip(&plain_results) {
            assert_eq!(a.chunk.page_title, b.chunk.page_title);
            assert!((a.score - b.score).abs() < 1e-6);
            assert_eq!(a.final_query, a.original_query);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refiner_timeout_falls_back() {
        let retriever = wireless_retriever(SlowRefiner);
        let results = retriever
            .search(
                "wireless network setup",
                SearchOptions {
                    top_k: 2,
                    refine: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].final_query, "wireless network setup");
    }

    #[tokio::test]
    async fn test_missing_index_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WikiseekConfig::default();
        config.index.dir = dir.path().to_path_buf();

        let embedder = FixedEmbedder::new(&[], vec![1.0, 0.0, 0.0]);
        let retriever = Retriever::new(&config, Arc::new(embedder), Arc::new(PassthroughRefiner));

        let err = retriever
            .search("anything", SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WikiseekError::IndexUnavailable { .. }));
        assert!(err.to_string().contains("build"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected() {
        let retriever = wireless_retriever(PassthroughRefiner);

        let err = retriever
            .search("", SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WikiseekError::InvalidArgument { .. }));

        let err = retriever
            .search(
                "ok",
                SearchOptions {
                    top_k: 0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WikiseekError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_rebuild_swaps_index() {
        let retriever = wireless_retriever(PassthroughRefiner);

        let replacement = vec![chunk("Bluetooth", "Pair devices with bluetoothctl", ChunkType::Large)];
        retriever
            .rebuild(vec![vec![1.0, 0.0, 0.0]], replacement)
            .unwrap();

        let results = retriever
            .search("wireless network setup", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.page_title, "Bluetooth");
        assert_eq!(retriever.stats().total_chunks, 1);
    }
}
