//! Flat inner-product index and its shared handle.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use wikiseek_core::{Chunk, IndexStats, IndexStatus, Result, WikiseekError};

use crate::artifact::{self, INDEX_FILE, METADATA_FILE};

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// An immutable, loaded vector index: one unit vector per chunk, with the
/// chunk metadata array index-aligned alongside it.
///
/// Search takes `&self` over immutable data, so concurrent reads need no
/// locking.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    /// Row-major flattened vectors, `chunks.len() * dimension` values.
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
    checksum: [u8; 32],
}

impl VectorIndex {
    /// Build an index from parallel vector and chunk arrays.
    ///
    /// Vectors must already be unit-normalized and uniform in dimension;
    /// a count or dimension mismatch is rejected.
    pub fn build(vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>) -> Result<Self> {
        if vectors.len() != chunks.len() {
            return Err(WikiseekError::CountMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
            });
        }

        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for v in &vectors {
            if v.len() != dimension {
                return Err(WikiseekError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            flat.extend_from_slice(v);
        }

        let mut hasher = blake3::Hasher::new();
        for value in &flat {
            hasher.update(&value.to_le_bytes());
        }

        Ok(Self {
            dimension,
            vectors: flat,
            chunks,
            checksum: *hasher.finalize().as_bytes(),
        })
    }

    /// Load an index from a directory.
    ///
    /// Returns `Ok(None)` when either artifact is missing (recoverable);
    /// a corrupt artifact or a vector/chunk count mismatch is an error.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);

        if !index_path.exists() || !metadata_path.exists() {
            debug!("Index artifacts not found in {:?}", dir);
            return Ok(None);
        }

        info!("Loading index from {:?}", index_path);
        let payload = artifact::read_vectors(&index_path)?;

        info!("Loading metadata from {:?}", metadata_path);
        let file = File::open(&metadata_path)?;
        let chunks: Vec<Chunk> = serde_json::from_reader(BufReader::new(file))?;

        if payload.count != chunks.len() {
            return Err(WikiseekError::CountMismatch {
                vectors: payload.count,
                chunks: chunks.len(),
            });
        }

        info!(
            "Loaded index with {} vectors and {} chunks (dim {})",
            payload.count,
            chunks.len(),
            payload.dimension
        );

        Ok(Some(Self {
            dimension: payload.dimension,
            vectors: payload.data,
            chunks,
            checksum: payload.checksum,
        }))
    }

    /// Persist both artifacts into a directory.
    ///
    /// Each file is written to a temp sibling and renamed into place, so a
    /// successful save never leaves a partial vector file paired with
    /// mismatched metadata. Existing artifacts are overwritten.
    pub fn save(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;

        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let index_tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        let metadata_tmp = dir.join(format!("{}.tmp", METADATA_FILE));

        info!("Saving index to {:?}", index_path);
        artifact::write_vectors(&index_tmp, self.dimension, &self.vectors)?;

        info!("Saving metadata to {:?}", metadata_path);
        let file = File::create(&metadata_tmp)?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, &self.chunks)?;
        std::io::Write::flush(&mut w)?;

        std::fs::rename(&index_tmp, &index_path)?;
        std::fs::rename(&metadata_tmp, &metadata_path)?;

        info!("Index and metadata saved");
        Ok((index_path, metadata_path))
    }

    /// k-nearest neighbors by inner product.
    ///
    /// The caller pre-normalizes `query` to unit length so the returned
    /// scores are cosine similarities. Returns at most `k` pairs of
    /// (chunk position, score), best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(WikiseekError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension.max(1))
            .enumerate()
            .map(|(i, row)| {
                let dot = row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>();
                (i, dot)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    /// Chunk metadata at a given position.
    pub fn chunk(&self, idx: usize) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Diagnostic statistics.
    pub fn stats(&self) -> IndexStats {
        let mut chunk_types = std::collections::BTreeMap::new();
        for chunk in &self.chunks {
            *chunk_types.entry(chunk.chunk_type).or_insert(0) += 1;
        }

        IndexStats {
            status: IndexStatus::Loaded,
            total_vectors: self.chunks.len(),
            total_chunks: self.chunks.len(),
            dimension: self.dimension,
            chunk_types,
            checksum: Some(hex::encode(self.checksum)),
        }
    }
}

/// Shared, swappable reference to the active index.
///
/// Searches clone the inner `Arc` and read without holding the lock, so a
/// concurrent rebuild never blocks or tears an in-flight search: it builds
/// a fresh [`VectorIndex`] and swaps the reference.
pub struct IndexHandle {
    inner: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexHandle {
    /// An empty handle with nothing loaded.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// A handle wrapping an already-built index.
    pub fn new(index: VectorIndex) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(index))),
        }
    }

    /// Whether an index is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.inner.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// The active index snapshot.
    ///
    /// Errors with [`WikiseekError::IndexNotLoaded`] when nothing is
    /// loaded; a programmer error, not a retry case.
    pub fn current(&self) -> Result<Arc<VectorIndex>> {
        self.inner
            .read()
            .map_err(|_| WikiseekError::internal("index lock poisoned"))?
            .clone()
            .ok_or(WikiseekError::IndexNotLoaded)
    }

    /// Load artifacts from a directory and swap them in.
    ///
    /// Returns `Ok(false)` when the artifacts are missing; errors are
    /// fatal (corrupt artifact or count mismatch).
    pub fn load(&self, dir: &Path) -> Result<bool> {
        match VectorIndex::load(dir)? {
            Some(index) => {
                self.replace(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Copy-and-swap replacement of the active index.
    pub fn replace(&self, index: VectorIndex) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| WikiseekError::internal("index lock poisoned"))?;
        *guard = Some(Arc::new(index));
        Ok(())
    }

    /// Diagnostic statistics for the active index.
    pub fn stats(&self) -> IndexStats {
        match self.inner.read() {
            Ok(guard) => match guard.as_ref() {
                Some(index) => index.stats(),
                None => IndexStats::not_loaded(),
            },
            Err(_) => IndexStats::not_loaded(),
        }
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wikiseek_core::ChunkType;

    fn chunk(title: &str, content: &str, chunk_type: ChunkType) -> Chunk {
        Chunk {
            page_title: title.to_string(),
            section_path: "Configuration".to_string(),
            content: content.to_string(),
            chunk_text: format!("{}\n{}", title, content),
            url: format!("https://wiki.example.org/title/{}", title),
            chunk_type,
            section_level: 2,
        }
    }

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let mut v = v;
        l2_normalize(&mut v);
        v
    }

    fn sample_index() -> VectorIndex {
        let vectors = vec![
            unit(vec![1.0, 0.0, 0.0]),
            unit(vec![0.0, 1.0, 0.0]),
            unit(vec![1.0, 1.0, 0.0]),
        ];
        let chunks = vec![
            chunk("NetworkManager", "Configure NetworkManager", ChunkType::Medium),
            chunk("Iwd", "Use iwctl", ChunkType::Small),
            chunk("Wireless", "Wireless overview", ChunkType::Large),
        ];
        VectorIndex::build(vectors, chunks).unwrap()
    }

    #[test]
    fn test_build_count_mismatch() {
        let err = VectorIndex::build(
            vec![unit(vec![1.0, 0.0])],
            vec![
                chunk("A", "a", ChunkType::Small),
                chunk("B", "b", ChunkType::Small),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, WikiseekError::CountMismatch { .. }));
    }

    #[test]
    fn test_build_ragged_dimensions() {
        let err = VectorIndex::build(
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
            vec![
                chunk("A", "a", ChunkType::Small),
                chunk("B", "b", ChunkType::Small),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, WikiseekError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = sample_index();
        let query = unit(vec![1.0, 0.1, 0.0]);

        let hits = index.search(&query, 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert!(hits[0].1 >= hits[1].1);
        assert!(hits[1].1 >= hits[2].1);
    }

    #[test]
    fn test_search_k_larger_than_corpus() {
        let index = sample_index();
        let query = unit(vec![0.0, 1.0, 0.0]);
        let hits = index.search(&query, 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = sample_index();
        let err = index.search(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, WikiseekError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_save_load_roundtrip_preserves_stats() {
        let dir = tempdir().unwrap();
        let index = sample_index();
        let before = index.stats();

        index.save(dir.path()).unwrap();
        let loaded = VectorIndex::load(dir.path()).unwrap().unwrap();
        let after = loaded.stats();

        assert_eq!(after.total_vectors, before.total_vectors);
        assert_eq!(after.total_chunks, before.total_chunks);
        assert_eq!(after.dimension, before.dimension);
        assert_eq!(after.checksum, before.checksum);
        assert_eq!(after.chunk_types, before.chunk_types);
    }

    #[test]
    fn test_load_missing_artifacts() {
        let dir = tempdir().unwrap();
        assert!(VectorIndex::load(dir.path()).unwrap().is_none());

        // Only one of the two files present is still "missing".
        std::fs::write(dir.path().join(INDEX_FILE), b"x").unwrap();
        assert!(VectorIndex::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_count_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let index = sample_index();
        index.save(dir.path()).unwrap();

        // Rewrite metadata with one chunk dropped.
        let chunks: Vec<Chunk> = vec![chunk("A", "a", ChunkType::Small)];
        std::fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_vec(&chunks).unwrap(),
        )
        .unwrap();

        let err = VectorIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, WikiseekError::CountMismatch { .. }));
    }

    #[test]
    fn test_handle_not_loaded() {
        let handle = IndexHandle::empty();
        assert!(!handle.is_loaded());
        let err = handle.current().unwrap_err();
        assert!(matches!(err, WikiseekError::IndexNotLoaded));
        assert_eq!(handle.stats().status, IndexStatus::NotLoaded);
    }

    #[test]
    fn test_handle_load_and_swap() {
        let dir = tempdir().unwrap();
        sample_index().save(dir.path()).unwrap();

        let handle = IndexHandle::empty();
        assert!(!handle.load(tempdir().unwrap().path()).unwrap());
        assert!(handle.load(dir.path()).unwrap());
        assert!(handle.is_loaded());

        // In-flight snapshot survives a swap.
        let snapshot = handle.current().unwrap();
        handle
            .replace(
                VectorIndex::build(
                    vec![unit(vec![0.0, 0.0, 1.0])],
                    vec![chunk("New", "new", ChunkType::Small)],
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(handle.current().unwrap().len(), 1);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
