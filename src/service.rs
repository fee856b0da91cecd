//! Process-level wiring of the pipeline.
//!
//! Every collaborator is constructed once and passed in explicitly — no
//! module-level singletons — so lifetimes are obvious and tests can swap any
//! seam. [`RagServiceBuilder`] assembles the defaults (sqlite collection,
//! redis or in-memory cache) from [`Settings`]; the host process keeps one
//! [`RagService`] and hands questions and uploads to it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::gateway::AnswerGateway;
use crate::cache::{CacheLookup, CacheStore, MemoryCacheStore, RedisCacheStore, ResponseCache};
use crate::chunking::Chunker;
use crate::config::Settings;
use crate::embeddings::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::ingestion::{Document, IngestReport, split_document};
use crate::orchestrator::{GeneratedAnswer, QueryOrchestrator};
use crate::stores::{SqliteVectorStore, VectorStore};
use crate::types::{RagError, Result};

/// Where a chat answer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Cache,
    Llm,
}

/// Final reply for one question, shaped for the front end's
/// `{"answer": …, "source": "cache"|"llm"}` contract.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub source: AnswerSource,
}

/// The assembled question-answering pipeline.
pub struct RagService {
    chunker: Chunker,
    cache: ResponseCache,
    index: Arc<VectorIndex>,
    orchestrator: QueryOrchestrator,
}

impl RagService {
    pub fn builder() -> RagServiceBuilder {
        RagServiceBuilder::default()
    }

    /// Answers a question, consulting the cache first.
    ///
    /// Only real answers are cached; fallback text would otherwise keep
    /// apologizing for a full TTL after a transient generator hiccup.
    pub async fn chat(&self, question: &str) -> Result<ChatReply> {
        if let CacheLookup::Hit(answer) = self.cache.get(question).await {
            tracing::debug!("cache hit");
            return Ok(ChatReply {
                answer,
                source: AnswerSource::Cache,
            });
        }

        let outcome = self.orchestrator.answer(question).await?;
        if let GeneratedAnswer::Answered(text) = &outcome {
            self.cache.set(question, text).await;
        }
        Ok(ChatReply {
            answer: outcome.into_text(),
            source: AnswerSource::Llm,
        })
    }

    /// Chunks, embeds, and persists one extracted document.
    ///
    /// Every failure on this path is a hard error — a partially ingested
    /// document must surface, not hide.
    pub async fn ingest(&self, document: Document) -> Result<IngestReport> {
        let (inputs, skipped) = split_document(&self.chunker, &document);
        tracing::info!(
            source = %document.source,
            chunks = inputs.len(),
            skipped,
            "ingesting document"
        );
        let chunks_written = self.index.add(inputs).await?;
        Ok(IngestReport {
            source: document.source,
            chunks_written,
            skipped,
        })
    }

    /// Seeds the corpus only when the persisted collection is empty, so a
    /// restarted process reuses its existing index instead of re-embedding.
    pub async fn ensure_corpus(&self, documents: Vec<Document>) -> Result<Vec<IngestReport>> {
        let existing = self.index.count().await?;
        if existing > 0 {
            tracing::info!(chunks = existing, "collection already populated; skipping ingest");
            return Ok(Vec::new());
        }
        let mut reports = Vec::with_capacity(documents.len());
        for document in documents {
            reports.push(self.ingest(document).await?);
        }
        Ok(reports)
    }

    /// The underlying index, for hosts that query it directly.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

/// Builder wiring the pipeline's collaborators.
///
/// The embedding provider and answer gateway are required; the vector store
/// and cache store default from [`Settings`] (sqlite collection file, redis
/// when `cache_url` is set, in-memory otherwise).
#[derive(Default)]
pub struct RagServiceBuilder {
    settings: Option<Settings>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    gateway: Option<Arc<dyn AnswerGateway>>,
    store: Option<Arc<dyn VectorStore>>,
    cache_store: Option<Arc<dyn CacheStore>>,
}

impl RagServiceBuilder {
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn AnswerGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Overrides the default sqlite-backed vector store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the cache store selected from settings.
    #[must_use]
    pub fn cache_store(mut self, cache_store: Arc<dyn CacheStore>) -> Self {
        self.cache_store = Some(cache_store);
        self
    }

    pub async fn build(self) -> Result<RagService> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;

        let embedder = self
            .embedder
            .ok_or_else(|| RagError::Config("an embedding provider is required".into()))?;
        let gateway = self
            .gateway
            .ok_or_else(|| RagError::Config("an answer gateway is required".into()))?;

        let store: Arc<dyn VectorStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteVectorStore::open(settings.collection_path()).await?),
        };

        let cache_store: Arc<dyn CacheStore> = match self.cache_store {
            Some(cache_store) => cache_store,
            None => match &settings.cache_url {
                Some(url) => Arc::new(RedisCacheStore::connect(url)?),
                None => Arc::new(MemoryCacheStore::new()),
            },
        };

        let chunker = Chunker::new(settings.chunk_size, settings.chunk_overlap)?;
        let cache = ResponseCache::new(cache_store, settings.cache_ttl);
        let index = Arc::new(VectorIndex::new(
            embedder,
            store,
            settings.embed_batch_size,
        ));
        let orchestrator = QueryOrchestrator::new(Arc::clone(&index), gateway, settings);

        Ok(RagService {
            chunker,
            cache,
            index,
            orchestrator,
        })
    }
}
