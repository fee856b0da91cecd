//! Embedding provider seam.
//!
//! Ingestion and querying must run through the *same* embedding function —
//! mixing models silently degrades relevance without erroring. The pipeline
//! therefore holds a single [`EmbeddingProvider`] behind an `Arc` and threads
//! it through both paths. [`RigEmbeddingProvider`] adapts any rig-core
//! [`EmbeddingModel`]; [`MockEmbeddingProvider`] is a deterministic local
//! embedder for tests and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rig::embeddings::EmbeddingModel;

use crate::types::{RagError, Result};

/// Text-to-vector function used for both ingestion and queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the underlying model. Persisted with the
    /// collection so a reopened index can detect an embedder swap.
    fn id(&self) -> &str;

    /// Dimension of produced vectors.
    fn dims(&self) -> usize;

    /// Embeds a batch of texts, one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text (queries).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        self.embed_batch(&texts)
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vectors".into()))
    }
}

/// Adapter over a rig-core embedding model (OpenAI et al.).
#[derive(Clone)]
pub struct RigEmbeddingProvider<M> {
    model: M,
    id: String,
}

impl<M> RigEmbeddingProvider<M>
where
    M: EmbeddingModel,
{
    /// Wraps `model`, recording `id` as the persisted embedder marker
    /// (conventionally the provider's model name).
    pub fn new(model: M, id: impl Into<String>) -> Self {
        Self {
            model,
            id: id.into(),
        }
    }
}

#[async_trait]
impl<M> EmbeddingProvider for RigEmbeddingProvider<M>
where
    M: EmbeddingModel + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn dims(&self) -> usize {
        self.model.ndims()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|err| RagError::Embedding(err.to_string()))?;
        Ok(embeddings
            .into_iter()
            .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}

/// Deterministic hashed bag-of-words embedder.
///
/// Each lowercased whitespace token hashes into one of `dims` buckets; the
/// counted vector is L2-normalized. Identical text always maps to the same
/// vector, and texts sharing more tokens land closer in cosine space, which
/// makes relevance-ordering assertions meaningful in tests.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dims: usize,
}

impl MockEmbeddingProvider {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new() -> Self {
        Self::with_dims(Self::DEFAULT_DIMS)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dims;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            // Blank text still needs a unit vector so cosine stays defined.
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn id(&self) -> &str {
        "mock-hashed-bow"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
