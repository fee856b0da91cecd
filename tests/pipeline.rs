//! End-to-end pipeline tests with mock providers.
//!
//! Every scenario runs against a real sqlite-vec collection in a temp
//! directory, the deterministic mock embedder, and fake answer gateways,
//! so the suite is hermetic and CI-safe.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::tempdir;

use answersmith::{
    AnswerGateway, AnswerSource, CacheStore, Document, FALLBACK_ANSWER, GenerationParams,
    MockEmbeddingProvider, RagError, RagService, Result, Settings,
};

/// Gateway that records every call and replies with a numbered string.
struct RecordingGateway {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AnswerGateway for RecordingGateway {
    async fn complete(
        &self,
        system: &str,
        question: &str,
        _params: &GenerationParams,
    ) -> Result<String> {
        let mut calls = self.calls.lock();
        calls.push((system.to_string(), question.to_string()));
        Ok(format!("reply-{}", calls.len()))
    }
}

/// Gateway that always fails, counting attempts.
struct FailingGateway {
    attempts: AtomicUsize,
}

impl FailingGateway {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnswerGateway for FailingGateway {
    async fn complete(
        &self,
        _system: &str,
        _question: &str,
        _params: &GenerationParams,
    ) -> Result<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RagError::Generation("simulated outage".into()))
    }
}

/// Cache store that errors on every operation.
struct BrokenCacheStore;

#[async_trait]
impl CacheStore for BrokenCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(RagError::Cache("cache process down".into()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(RagError::Cache("cache process down".into()))
    }
    async fn clear(&self) -> Result<()> {
        Err(RagError::Cache("cache process down".into()))
    }
}

fn test_settings(dir: &Path) -> Settings {
    Settings {
        persist_dir: dir.to_path_buf(),
        collection: "pipeline_test".to_string(),
        top_k: 3,
        // Keep everything retrievable unless a scenario narrows it.
        max_distance: 2.0,
        cache_ttl: Duration::from_secs(60),
        ..Default::default()
    }
}

async fn service_with(
    settings: Settings,
    gateway: Arc<dyn AnswerGateway>,
    cache_store: Option<Arc<dyn CacheStore>>,
) -> RagService {
    let mut builder = RagService::builder()
        .settings(settings)
        .embedder(Arc::new(MockEmbeddingProvider::new()))
        .gateway(gateway);
    if let Some(cache_store) = cache_store {
        builder = builder.cache_store(cache_store);
    }
    builder.build().await.unwrap()
}

fn report_corpus() -> Vec<Document> {
    vec![
        Document::new(
            "report-2023.pdf",
            "Hunger rose in 2023 because drought and conflict cut harvests across several regions.",
        )
        .with_scope("2023"),
        Document::new(
            "report-2024.pdf",
            "Hunger eased in 2024 as favourable rains restored harvests and trade routes reopened.",
        )
        .with_scope("2024"),
    ]
}

#[tokio::test]
async fn comparative_question_composes_both_scopes_in_fixed_order() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let service = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let reply = service
        .chat("Compare the reasons for hunger in 2023 and 2024")
        .await
        .unwrap();

    assert_eq!(reply.source, AnswerSource::Llm);
    assert!(reply.answer.starts_with("Comparison between 2023 and 2024:"));
    let section_2023 = reply.answer.find("2023 analysis:").unwrap();
    let section_2024 = reply.answer.find("2024 analysis:").unwrap();
    assert!(
        section_2023 < section_2024,
        "earlier scope must be presented first: {}",
        reply.answer
    );

    // Each scope is answered in isolation: two generation calls, each seeing
    // only its own scope's provenance tags.
    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].0.contains("scope: 2023"));
    assert!(!calls[0].0.contains("scope: 2024"));
    assert!(calls[1].0.contains("scope: 2024"));
    assert!(!calls[1].0.contains("scope: 2023"));
    // Composition is concatenation of the scoped replies, not a third call.
    assert!(reply.answer.contains("reply-1"));
    assert!(reply.answer.contains("reply-2"));
}

#[tokio::test]
async fn single_scope_question_restricts_retrieval_and_prefixes_the_label() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let service = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let reply = service
        .chat("What did the 2023 report say about drought?")
        .await
        .unwrap();

    assert!(reply.answer.starts_with("Response based on 2023 documents:"));
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains("scope: 2023"));
    assert!(!calls[0].0.contains("scope: 2024"));
}

#[tokio::test]
async fn unscoped_question_falls_back_to_the_most_recent_scope() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let service = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let reply = service.chat("Why did hunger change?").await.unwrap();

    assert!(
        reply
            .answer
            .starts_with("Response based on most recent 2024 documents:"),
        "got: {}",
        reply.answer
    );
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains("scope: 2024"));
    assert!(!calls[0].0.contains("scope: 2023"));
    // The user question reaches the generator verbatim.
    assert_eq!(calls[0].1, "Why did hunger change?");
}

#[tokio::test]
async fn chunks_past_the_distance_cutoff_stay_out_of_the_context() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let settings = Settings {
        max_distance: 0.5,
        ..test_settings(dir.path())
    };
    let service = service_with(settings, gateway.clone(), None).await;
    service
        .ensure_corpus(vec![
            Document::new("relevant.txt", "drought ruined the wheat harvest").with_scope("2024"),
            Document::new("unrelated.txt", "shipping manifests itemize container weights")
                .with_scope("2024"),
        ])
        .await
        .unwrap();

    service
        .chat("drought ruined the wheat harvest")
        .await
        .unwrap();

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains("drought ruined the wheat harvest"));
    assert!(
        !calls[0].0.contains("shipping manifests"),
        "distant chunk leaked into the context: {}",
        calls[0].0
    );
}

#[tokio::test]
async fn generation_failure_yields_the_fallback_text_and_is_not_cached() {
    let dir = tempdir().unwrap();
    let gateway = FailingGateway::new();
    let service = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let first = service.chat("Why did hunger change?").await.unwrap();
    assert_eq!(first.answer, FALLBACK_ANSWER);
    assert_eq!(first.source, AnswerSource::Llm);

    // The fallback must not be served from cache on the retry.
    let second = service.chat("Why did hunger change?").await.unwrap();
    assert_eq!(second.answer, FALLBACK_ANSWER);
    assert_eq!(gateway.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn answers_are_cached_and_served_without_regenerating() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let service = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let first = service.chat("What did the 2023 report say?").await.unwrap();
    assert_eq!(first.source, AnswerSource::Llm);

    let second = service.chat("What did the 2023 report say?").await.unwrap();
    assert_eq!(second.source, AnswerSource::Cache);
    assert_eq!(second.answer, first.answer);

    // Keying normalizes case and padding.
    let third = service
        .chat("  WHAT DID THE 2023 REPORT SAY?  ")
        .await
        .unwrap();
    assert_eq!(third.source, AnswerSource::Cache);

    assert_eq!(gateway.calls().len(), 1);
}

#[tokio::test]
async fn broken_cache_store_never_fails_the_request() {
    let dir = tempdir().unwrap();
    let gateway = RecordingGateway::new();
    let service = service_with(
        test_settings(dir.path()),
        gateway.clone(),
        Some(Arc::new(BrokenCacheStore)),
    )
    .await;
    service.ensure_corpus(report_corpus()).await.unwrap();

    let first = service.chat("What did the 2023 report say?").await.unwrap();
    assert_eq!(first.source, AnswerSource::Llm);
    let second = service.chat("What did the 2023 report say?").await.unwrap();
    assert_eq!(second.source, AnswerSource::Llm, "every lookup degrades to a miss");
    assert_eq!(gateway.calls().len(), 2);
}

#[tokio::test]
async fn querying_an_empty_collection_is_a_hard_error() {
    let dir = tempdir().unwrap();
    let service = service_with(test_settings(dir.path()), RecordingGateway::new(), None).await;

    let err = service.chat("Anything in here?").await.unwrap_err();
    assert!(matches!(err, RagError::EmptyIndex), "got {err:?}");
}

#[tokio::test]
async fn restarted_service_reuses_the_persisted_collection() {
    let dir = tempdir().unwrap();

    let first = service_with(test_settings(dir.path()), RecordingGateway::new(), None).await;
    let reports = first.ensure_corpus(report_corpus()).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.chunks_written > 0));
    drop(first);

    let gateway = RecordingGateway::new();
    let second = service_with(test_settings(dir.path()), gateway.clone(), None).await;
    let reports = second.ensure_corpus(report_corpus()).await.unwrap();
    assert!(reports.is_empty(), "populated collection must not re-ingest");

    let reply = second.chat("What did the 2024 report say?").await.unwrap();
    assert!(reply.answer.starts_with("Response based on 2024 documents:"));
    assert_eq!(gateway.calls().len(), 1);
}

#[tokio::test]
async fn chat_reply_serializes_to_the_front_end_shape() {
    let reply = answersmith::ChatReply {
        answer: "text".to_string(),
        source: AnswerSource::Cache,
    };
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["source"], "cache");
    assert_eq!(json["answer"], "text");
}
