//! wikiseek-index - Persisted flat vector index
//!
//! Stores one unit-normalized embedding per chunk plus an index-aligned
//! chunk metadata array, and answers k-nearest-neighbor queries by inner
//! product (cosine similarity over unit vectors).
//!
//! # Artifacts
//!
//! An index directory holds two co-located files:
//!
//! - `index.vec`: versioned little-endian binary with a header, the
//!   row-major f32 payload, and a blake3 payload checksum.
//! - `metadata.json`: the chunk array, index-aligned with the vectors.
//!
//! Loading either without the other is a recoverable "not there"; a corrupt
//! artifact or a vector/chunk count mismatch is a fatal error.
//!
//! # Concurrency
//!
//! A loaded [`VectorIndex`] is immutable and safe for concurrent reads.
//! [`IndexHandle`] adds copy-and-swap replacement: rebuilds construct a
//! fresh index and atomically swap the shared reference, so in-flight
//! searches always observe a consistent snapshot.

mod artifact;
mod index;

pub use artifact::{INDEX_FILE, METADATA_FILE};
pub use index::{l2_normalize, IndexHandle, VectorIndex};
