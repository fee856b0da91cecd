//! Retrieval-augmented question answering over ingested document corpora.
//!
//! ```text
//! Extracted text ──► chunking::Chunker ──► ingestion::split_document
//!                                                    │
//!                                                    ▼
//!                    embeddings::EmbeddingProvider ──► index::VectorIndex.add
//!                                                          │
//!                                                          ▼
//!                                          stores::SqliteVectorStore (persisted)
//!
//! Question ──► cache::ResponseCache.get ──(miss)──► orchestrator::QueryOrchestrator
//!                                                     │  scope detection
//!                                                     │  VectorIndex.query (×1 or ×N scopes)
//!                                                     │  answer::prompt context assembly
//!                                                     ▼
//!                                          answer::AnswerGateway ──► ResponseCache.set
//! ```
//!
//! [`service::RagService`] wires the pieces together once at process start;
//! the HTTP front end, PDF extraction, and the model calls themselves live
//! outside this crate and plug in at the provider seams.

pub mod answer;
pub mod cache;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod ingestion;
pub mod orchestrator;
pub mod service;
pub mod stores;
pub mod types;

pub use answer::gateway::{AnswerGateway, GenerationParams, RigAnswerGateway};
pub use cache::{CacheLookup, CacheStore, MemoryCacheStore, RedisCacheStore, ResponseCache};
pub use chunking::Chunker;
pub use config::Settings;
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, RigEmbeddingProvider};
pub use index::{RetrievalResult, VectorIndex};
pub use ingestion::{Document, IngestReport};
pub use orchestrator::{FALLBACK_ANSWER, GeneratedAnswer, QueryIntent, QueryOrchestrator};
pub use service::{AnswerSource, ChatReply, RagService, RagServiceBuilder};
pub use stores::{ChunkMetadata, SqliteVectorStore, VectorStore};
pub use types::{RagError, Result};
