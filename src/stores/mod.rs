//! Storage backends for chunk text, metadata, and embedding vectors.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorStore trait│
//!                  │  (async add/query)│
//!                  └────────┬─────────┘
//!                           │
//!                           ▼
//!                  ┌──────────────────┐
//!                  │     SQLite       │
//!                  │   sqlite-vec     │
//!                  └──────────────────┘
//! ```
//!
//! The store owns every persisted index entry: rows are created by
//! [`VectorStore::insert_chunks`], never mutated, and deleted only by a full
//! [`VectorStore::reset`]. Writers are serialized by the backing connection;
//! readers may run concurrently with a batch insert and may or may not see
//! the not-yet-committed batch — visibility of new chunks is eventual, not
//! linearizable.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

pub use sqlite::SqliteVectorStore;

/// Provenance attached to every chunk.
///
/// A fixed record rather than an open-ended map: provenance tagging and
/// scope-restricted retrieval both depend on exactly these fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Originating document name.
    pub source: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Corpus subset label (e.g. a year), when the document carries one.
    pub scope: Option<String>,
}

/// A chunk with its embedding, ready for insertion.
#[derive(Clone, Debug)]
pub struct NewChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// One stored chunk scored against a query vector.
///
/// `distance` is the store's native cosine distance — lower is closer. It is
/// comparable only within the result set of a single search call.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    /// Monotonic insertion sequence number; doubles as the tie-breaker
    /// (first-inserted wins).
    pub seq: i64,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Persistent vector collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts a batch atomically. Sequence numbers are assigned
    /// monotonically in input order. Returns the number of rows written.
    ///
    /// The first insert fixes the collection's embedder identity and vector
    /// dimension; later batches must match the dimension, and a differing
    /// embedder id is logged as a relevance hazard.
    async fn insert_chunks(&self, embedder_id: &str, chunks: Vec<NewChunk>) -> Result<usize>;

    /// Returns up to `k` chunks nearest to `embedding`, best first, ties
    /// broken by ascending sequence number. `scope` restricts the search to
    /// chunks carrying that scope label.
    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;

    /// Distinct scope labels present in the collection, sorted ascending.
    async fn scopes(&self) -> Result<Vec<String>>;

    /// Drops every stored chunk and the collection's embedder marker.
    async fn reset(&self) -> Result<()>;
}
