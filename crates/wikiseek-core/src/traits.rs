//! Capability traits defining the seams between components.

use async_trait::async_trait;

use crate::error::Result;

/// Embedding model capability.
///
/// Implementations own any prefixing convention their model requires
/// (e.g. `"query: "` / `"passage: "` for e5-family models); callers pass
/// bare text. Handles are expensive to build and should be created once
/// and shared across requests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of passage texts.
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum context length in tokens.
    fn max_tokens(&self) -> usize;
}

/// Query refinement capability: rewrite a colloquial query into technical
/// search terms.
///
/// The engine always calls through this interface; when no model is
/// configured a passthrough implementation stands in, so call sites never
/// branch on availability. Implementations must return errors rather than
/// panic; the engine recovers from any error by searching the original
/// query.
#[async_trait]
pub trait QueryRefiner: Send + Sync {
    /// Rewrite the query. Returning the input unchanged is valid.
    async fn refine(&self, query: &str) -> Result<String>;

    /// Short identifier for logs (e.g. `"passthrough"`, `"ollama:llama3.1"`).
    fn name(&self) -> &str;
}
