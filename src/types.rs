//! Shared error and result types for the answering pipeline.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Errors surfaced by the retrieval-and-orchestration pipeline.
///
/// Propagation policy:
///
/// * Ingestion-path failures ([`Chunking`](RagError::Chunking),
///   [`Embedding`](RagError::Embedding), [`Storage`](RagError::Storage))
///   are hard errors — a failed ingest must not leave a silently partial
///   document behind.
/// * [`Cache`](RagError::Cache) is constructed internally and never crosses
///   the [`ResponseCache`](crate::cache::ResponseCache) boundary; cache
///   trouble degrades to a miss.
/// * [`Generation`](RagError::Generation) is caught at the orchestrator and
///   flattened to a fallback answer; callers of
///   [`QueryOrchestrator::answer`](crate::orchestrator::QueryOrchestrator::answer)
///   never see it.
#[derive(Debug, Error)]
pub enum RagError {
    /// The vector collection holds no rows; querying it would return an
    /// ambiguous empty result instead of a diagnosis.
    #[error("vector index is empty; ingest documents before querying")]
    EmptyIndex,

    /// The embedding provider was unreachable or rejected the request.
    /// Never retried: without an embedding there is nothing to index or
    /// match against.
    #[error("embedding request failed: {0}")]
    Embedding(String),

    /// Vector store I/O or SQL failure.
    #[error("vector store failure: {0}")]
    Storage(String),

    /// Backing cache store failure. Swallowed by the response cache.
    #[error("cache store unavailable: {0}")]
    Cache(String),

    /// The answer generator failed (transport, quota, timeout). All
    /// subtypes are treated identically by the orchestrator.
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// Document text could not be split into chunks.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Invalid or inconsistent configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem trouble while opening or persisting a collection.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}
