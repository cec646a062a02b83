//! wikiseek-embed - ONNX embedding model wrapper
//!
//! Text embeddings for retrieval using e5-family models (e5-large-v2 by
//! default).
//!
//! # Features
//!
//! - ONNX Runtime inference on CPU
//! - Asymmetric retrieval prefixes (`"query: "` / `"passage: "`) applied
//!   here, so callers pass bare text
//! - Mean pooling with attention mask
//! - L2 normalization (unit vectors, so inner product = cosine)
//! - Batch embedding for index builds

mod onnx;

pub use onnx::{MockEmbedder, OnnxEmbedder};

// Re-export the Embedder trait for convenience
pub use wikiseek_core::Embedder;
