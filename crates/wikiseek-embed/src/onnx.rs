//! ONNX-based embedding model implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use wikiseek_core::{Embedder, EmbeddingConfig, Result, WikiseekError};

/// e5-large-v2 configuration.
const EMBEDDING_DIM: usize = 1024;
const MAX_TOKENS: usize = 512;

/// e5 asymmetric retrieval prefixes.
const QUERY_PREFIX: &str = "query: ";
const PASSAGE_PREFIX: &str = "passage: ";

/// ONNX-based embedder for e5-large-v2 or a compatible model.
pub struct OnnxEmbedder {
    /// ONNX inference session (Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    /// Embedding dimension.
    dimension: usize,

    /// Maximum token count.
    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Load the model and tokenizer named by the configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        info!("Loading ONNX model from {:?}", config.model_path);

        let session = Session::builder()
            .map_err(|e| WikiseekError::embedding(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| WikiseekError::embedding(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.num_threads)
            .map_err(|e| WikiseekError::embedding(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(&config.model_path)
            .map_err(|e| WikiseekError::embedding(format!("Failed to load model: {}", e)))?;

        info!("Loading tokenizer from {:?}", config.tokenizer_path);

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| WikiseekError::embedding(format!("Failed to load tokenizer: {}", e)))?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            EMBEDDING_DIM, MAX_TOKENS
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension: EMBEDDING_DIM,
            max_tokens: MAX_TOKENS,
        })
    }

    /// Embed a batch of texts with the given prefix.
    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(|s| s.as_str()).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| WikiseekError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| WikiseekError::embedding(format!("Failed to create input tensor: {}", e)))?;

        let attention_mask_tensor = Tensor::from_array((vec![batch_size, max_len], attention_mask))
            .map_err(|e| WikiseekError::embedding(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| WikiseekError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| WikiseekError::embedding(format!("Inference failed: {}", e)))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| WikiseekError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| WikiseekError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape: Vec<usize> = view.shape().to_vec();
        debug!("Output shape: {:?}", shape);

        match shape.len() {
            // (batch, seq, hidden): token embeddings, pool over the mask.
            3 => self.mean_pool(&view, &encodings, max_len),
            // (batch, hidden): already pooled by the model.
            2 => Ok((0..batch_size)
                .map(|i| {
                    let row: Vec<f32> = (0..shape[1]).map(|j| view[[i, j]]).collect();
                    l2_normalize(row)
                })
                .collect()),
            _ => Err(WikiseekError::embedding(format!(
                "Unexpected output shape: {:?}",
                shape
            ))),
        }
    }

    /// Attention-masked mean pooling over the sequence dimension.
    fn mean_pool(
        &self,
        tensor: &ArrayViewD<'_, f32>,
        encodings: &[tokenizers::Encoding],
        max_len: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let shape = tensor.shape();
        let seq_len = shape[1];
        let hidden_dim = shape[2];

        let mut embeddings = Vec::with_capacity(encodings.len());

        for (i, encoding) in encodings.iter().enumerate() {
            let mask = encoding.get_attention_mask();
            let valid = mask
                .iter()
                .take(max_len.min(seq_len))
                .filter(|&&m| m == 1)
                .count();

            if valid == 0 {
                embeddings.push(vec![0.0; hidden_dim]);
                continue;
            }

            let mut sum = vec![0.0f32; hidden_dim];
            for (j, &m) in mask.iter().take(max_len.min(seq_len)).enumerate() {
                if m == 1 {
                    for k in 0..hidden_dim {
                        sum[k] += tensor[[i, j, k]];
                    }
                }
            }

            let mean: Vec<f32> = sum.into_iter().map(|s| s / valid as f32).collect();
            embeddings.push(l2_normalize(mean));
        }

        Ok(embeddings)
    }
}

/// L2 normalize a vector, returning it unchanged when the norm is zero.
fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Inference runs synchronously; the session is not Send.
        self.embed_batch(texts, PASSAGE_PREFIX)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text], QUERY_PREFIX)?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| WikiseekError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Deterministic mock embedder for tests; no model files required.
pub struct MockEmbedder {
    dimension: usize,
    max_tokens: usize,
}

impl MockEmbedder {
    /// Create a mock with the default e5 shape.
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            max_tokens: MAX_TOKENS,
        }
    }

    /// Create a mock with a custom shape.
    pub fn with_config(dimension: usize, max_tokens: usize) -> Self {
        Self {
            dimension,
            max_tokens,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        // FNV-style mix so distinct texts land on distinct directions.
        let mut state = 0xcbf2_9ce4_8422_2325u64;
        for b in text.bytes() {
            state ^= b as u64;
            state = state.wrapping_mul(0x1000_0000_01b3);
        }

        let mut v: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mixed = state.wrapping_mul(i as u64 + 1).rotate_left(17);
                (mixed % 2000) as f32 / 1000.0 - 1.0
            })
            .collect();

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}
