//! wikiseek-refine - Query refinement capability
//!
//! Rewrites colloquial user queries ("wifi broken") into technical search
//! terms ("wireless network configuration troubleshooting") for better
//! retrieval.
//!
//! # Implementations
//!
//! - [`PassthroughRefiner`]: returns the query unchanged. Installed when no
//!   model is configured, so the engine always calls the same interface and
//!   never branches on availability.
//! - [`HttpRefiner`]: few-shot prompt against an Ollama-compatible
//!   generation endpoint, with response cleanup and a request deadline.
//!
//! Refinement failures never propagate past the engine: any error here is
//! logged and the original query is searched instead.

mod http;

pub use http::HttpRefiner;

use async_trait::async_trait;

use wikiseek_core::{QueryRefiner, Result};

/// Refiner that performs no rewriting.
pub struct PassthroughRefiner;

#[async_trait]
impl QueryRefiner for PassthroughRefiner {
    async fn refine(&self, query: &str) -> Result<String> {
        Ok(query.to_string())
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_returns_input() {
        let refiner = PassthroughRefiner;
        let refined = refiner.refine("wifi broken").await.unwrap();
        assert_eq!(refined, "wifi broken");
        assert_eq!(refiner.name(), "passthrough");
    }
}
