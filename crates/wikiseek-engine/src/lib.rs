//! wikiseek-engine - Retrieval orchestration
//!
//! Turns a raw user query into a final, ordered, deduplicated list of
//! result chunks:
//!
//! ```text
//! query -> (optional) refine -> embed -> over-fetch -> score -> sort
//!       -> dedup -> truncate -> re-rank
//! ```
//!
//! The engine takes its collaborators as explicit long-lived handles
//! (embedder, refiner, index), so multiple independently configured
//! engines can coexist in one process. Refinement failures are recovered
//! locally; a missing index is a hard stop with an actionable message.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wikiseek_engine::{Retriever, SearchOptions};
//!
//! let retriever = Retriever::new(&config, Arc::new(embedder), Arc::new(refiner));
//! let results = retriever.search("wifi broken", SearchOptions::default()).await?;
//! ```

mod retriever;

pub use retriever::{Retriever, SearchOptions};

// Re-export for convenience
pub use wikiseek_core::{SearchResult, WikiseekConfig};
