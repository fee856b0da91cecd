//! The vector index: batched embed-and-store ingestion plus scored queries.
//!
//! [`VectorIndex`] couples one [`EmbeddingProvider`] with one
//! [`VectorStore`]; both paths run through the same provider instance so the
//! embedding space stays consistent between ingestion and querying.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingProvider;
use crate::ingestion::ChunkInput;
use crate::stores::{ChunkMetadata, NewChunk, ScoredChunk, VectorStore};
use crate::types::{RagError, Result};

/// One retrieved chunk with its scores.
///
/// `distance` is the store's native metric (lower is closer); `relevance`
/// is its bounded conversion `1 / (1 + distance)`, strictly decreasing in
/// distance. Both are comparable only within a single query call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
    pub relevance: f32,
}

impl From<ScoredChunk> for RetrievalResult {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            content: hit.content,
            metadata: hit.metadata,
            distance: hit.distance,
            relevance: 1.0 / (1.0 + hit.distance),
        }
    }
}

/// Embedding-backed similarity index over a persistent chunk collection.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl VectorIndex {
    /// Couples `embedder` and `store`. `batch_size` bounds the number of
    /// texts per embedding request during ingestion.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Embeds and persists `inputs` in batches, returning rows written.
    ///
    /// Any embedding or storage failure aborts the ingest as a hard error;
    /// batches already committed remain (the corpus is append-only, and a
    /// partial document must be diagnosed rather than papered over).
    pub async fn add(&self, inputs: Vec<ChunkInput>) -> Result<usize> {
        if inputs.is_empty() {
            return Ok(0);
        }

        let total_batches = inputs.len().div_ceil(self.batch_size);
        let mut written = 0usize;

        for (batch_no, batch) in inputs.chunks(self.batch_size).enumerate() {
            tracing::info!(
                batch = batch_no + 1,
                of = total_batches,
                items = batch.len(),
                "embedding ingestion batch"
            );
            let texts: Vec<String> = batch.iter().map(|input| input.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }

            let rows: Vec<NewChunk> = batch
                .iter()
                .zip(vectors)
                .map(|(input, embedding)| NewChunk {
                    content: input.content.clone(),
                    metadata: input.metadata.clone(),
                    embedding,
                })
                .collect();
            written += self.store.insert_chunks(self.embedder.id(), rows).await?;
        }

        tracing::info!(chunks = written, "ingestion complete");
        Ok(written)
    }

    /// Returns the top-`k` chunks for `text`, best relevance first, optionally
    /// restricted to one scope.
    ///
    /// Fails with [`RagError::EmptyIndex`] when the collection holds no rows
    /// at all — an empty answer would be indistinguishable from "nothing
    /// matched".
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        if self.store.count().await? == 0 {
            return Err(RagError::EmptyIndex);
        }
        let embedding = self.embedder.embed_one(text).await?;
        let hits = self.store.search(&embedding, k, scope).await?;
        tracing::debug!(query = %text, hits = hits.len(), scope = ?scope, "retrieval complete");
        Ok(hits.into_iter().map(RetrievalResult::from).collect())
    }

    /// Number of chunks in the collection.
    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Scope labels known to the collection, ascending.
    pub async fn scopes(&self) -> Result<Vec<String>> {
        self.store.scopes().await
    }
}
