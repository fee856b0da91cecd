//! Query orchestration: intent detection, scoped retrieval, and composition.
//!
//! One `answer` call walks a fixed state machine:
//!
//! ```text
//! ScopeDetection ─► Retrieval(×1 or ×N) ─► ContextAssembly ─► Generation
//!                                                   │
//!                               [Compose if N > 1] ◄┘ ─► Done
//! ```
//!
//! No step retries. Retrieval and embedding failures propagate; generation
//! failures (including timeouts) collapse into a fixed fallback answer so
//! the caller always receives text once retrieval has succeeded.

use std::sync::Arc;

use regex::Regex;

use crate::answer::gateway::{AnswerGateway, GenerationParams};
use crate::answer::prompt::{assemble_context, system_instruction};
use crate::config::Settings;
use crate::index::VectorIndex;
use crate::types::Result;

/// Safe response returned whenever the answer generator fails.
pub const FALLBACK_ANSWER: &str =
    "I apologize, but I encountered an error while processing your question.";

/// What a question asks of the corpus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryIntent {
    /// Comparison across the given scopes, each answered in isolation.
    /// Labels are sorted ascending; presentation follows this order
    /// regardless of evaluation order.
    Comparative(Vec<String>),
    /// Exactly one scope mentioned.
    Scoped(String),
    /// No scope mentioned and no comparison language.
    Unscoped,
}

/// Generation outcome, tagged so callers can tell real answers from
/// fallbacks even though both flatten to plain text at the boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeneratedAnswer {
    Answered(String),
    Fallback(String),
}

impl GeneratedAnswer {
    pub fn is_fallback(&self) -> bool {
        matches!(self, GeneratedAnswer::Fallback(_))
    }

    pub fn text(&self) -> &str {
        match self {
            GeneratedAnswer::Answered(text) | GeneratedAnswer::Fallback(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            GeneratedAnswer::Answered(text) | GeneratedAnswer::Fallback(text) => text,
        }
    }

    /// Decorates real answers with a presentational prefix; fallback text is
    /// returned verbatim so its literal stays recognizable.
    fn decorated(self, prefix: &str) -> Self {
        match self {
            GeneratedAnswer::Answered(text) => {
                GeneratedAnswer::Answered(format!("{prefix}{text}"))
            }
            fallback => fallback,
        }
    }
}

/// Top-level coordinator for one question.
pub struct QueryOrchestrator {
    index: Arc<VectorIndex>,
    gateway: Arc<dyn AnswerGateway>,
    settings: Settings,
    compare_language: Regex,
}

impl QueryOrchestrator {
    pub fn new(
        index: Arc<VectorIndex>,
        gateway: Arc<dyn AnswerGateway>,
        settings: Settings,
    ) -> Self {
        let compare_language = Regex::new(r"(?i)\bcompar(?:e|es|ed|ing|ison|isons)\b")
            .expect("comparison pattern is valid");
        Self {
            index,
            gateway,
            settings,
            compare_language,
        }
    }

    /// Answers `question` against the corpus.
    ///
    /// Returns `Err` only for pre-generation failures (empty index,
    /// embedding, store). Generation trouble yields
    /// [`GeneratedAnswer::Fallback`].
    pub async fn answer(&self, question: &str) -> Result<GeneratedAnswer> {
        let known_scopes = self.index.scopes().await?;
        let intent = self.detect_intent(question, &known_scopes);
        tracing::debug!(?intent, "scope detection complete");

        match intent {
            QueryIntent::Comparative(scopes) => self.answer_comparative(question, &scopes).await,
            QueryIntent::Scoped(scope) => {
                let prefix = format!("Response based on {scope} documents:\n");
                Ok(self
                    .answer_scope(question, Some(scope.as_str()))
                    .await?
                    .decorated(&prefix))
            }
            QueryIntent::Unscoped => {
                let default = self
                    .settings
                    .default_scope
                    .clone()
                    .or_else(|| known_scopes.last().cloned());
                match default {
                    Some(scope) => {
                        let prefix =
                            format!("Response based on most recent {scope} documents:\n");
                        Ok(self
                            .answer_scope(question, Some(scope.as_str()))
                            .await?
                            .decorated(&prefix))
                    }
                    // Unlabeled corpus: answer over everything.
                    None => self.answer_scope(question, None).await,
                }
            }
        }
    }

    /// Classifies the question against the scope labels actually present in
    /// the corpus.
    ///
    /// Comparison intent = comparison language OR at least two distinct
    /// labels mentioned. Comparison language with fewer than two mentioned
    /// labels widens to every known scope; if that still leaves fewer than
    /// two, the intent degrades to scoped/unscoped.
    pub fn detect_intent(&self, question: &str, known_scopes: &[String]) -> QueryIntent {
        let mentioned: Vec<String> = known_scopes
            .iter()
            .filter(|label| mentions_label(question, label))
            .cloned()
            .collect();

        let wants_comparison = self.compare_language.is_match(question);
        if wants_comparison || mentioned.len() >= 2 {
            let mut scopes = if mentioned.len() >= 2 {
                mentioned.clone()
            } else {
                known_scopes.to_vec()
            };
            if scopes.len() >= 2 {
                scopes.sort();
                return QueryIntent::Comparative(scopes);
            }
        }

        match mentioned.into_iter().next() {
            Some(scope) => QueryIntent::Scoped(scope),
            None => QueryIntent::Unscoped,
        }
    }

    /// Answers each scope independently, then composes the sections by plain
    /// string concatenation in ascending label order. The generator is never
    /// asked to compare in a single call.
    async fn answer_comparative(
        &self,
        question: &str,
        scopes: &[String],
    ) -> Result<GeneratedAnswer> {
        let mut sections = Vec::with_capacity(scopes.len());
        let mut any_fallback = false;

        for scope in scopes {
            let outcome = self.answer_scope(question, Some(scope.as_str())).await?;
            any_fallback |= outcome.is_fallback();
            sections.push(format!("{scope} analysis:\n{}", outcome.into_text()));
        }

        let composed = format!(
            "Comparison between {}:\n\n{}",
            join_labels(scopes),
            sections.join("\n\n")
        );
        // A fallback in any section means the composition must not be cached
        // as a real answer.
        Ok(if any_fallback {
            GeneratedAnswer::Fallback(composed)
        } else {
            GeneratedAnswer::Answered(composed)
        })
    }

    /// Retrieve → assemble → generate for one scope (or the whole corpus).
    async fn answer_scope(
        &self,
        question: &str,
        scope: Option<&str>,
    ) -> Result<GeneratedAnswer> {
        let results = self
            .index
            .query(question, self.settings.top_k, scope)
            .await?;
        let context = assemble_context(&results, self.settings.max_distance);
        tracing::debug!(
            scope = ?scope,
            retrieved = results.len(),
            kept = context.matches("[source:").count(),
            "context assembled"
        );

        let system = system_instruction(&context);
        let params = GenerationParams {
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let generation = tokio::time::timeout(
            self.settings.request_timeout,
            self.gateway.complete(&system, question, &params),
        )
        .await;

        match generation {
            Ok(Ok(text)) => Ok(GeneratedAnswer::Answered(text)),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, scope = ?scope, "generation failed; returning fallback");
                Ok(GeneratedAnswer::Fallback(FALLBACK_ANSWER.to_string()))
            }
            Err(_elapsed) => {
                tracing::warn!(scope = ?scope, "generation timed out; returning fallback");
                Ok(GeneratedAnswer::Fallback(FALLBACK_ANSWER.to_string()))
            }
        }
    }
}

/// Word-boundary match of a scope label inside the question.
fn mentions_label(question: &str, label: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(label)))
        .map(|pattern| pattern.is_match(question))
        .unwrap_or(false)
}

fn join_labels(labels: &[String]) -> String {
    match labels {
        [] => String::new(),
        [only] => only.clone(),
        [a, b] => format!("{a} and {b}"),
        [head @ .., tail] => format!("{} and {tail}", head.join(", ")),
    }
}

// Detection is pure; exercised here without touching the index or gateway.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::SqliteVectorStore;
    use tempfile::tempdir;

    async fn orchestrator(dir: &std::path::Path) -> QueryOrchestrator {
        let store = SqliteVectorStore::open(dir.join("col.sqlite3")).await.unwrap();
        let index = Arc::new(VectorIndex::new(
            Arc::new(MockEmbeddingProvider::new()),
            Arc::new(store),
            128,
        ));
        struct NoopGateway;
        #[async_trait::async_trait]
        impl AnswerGateway for NoopGateway {
            async fn complete(
                &self,
                _system: &str,
                _question: &str,
                _params: &GenerationParams,
            ) -> Result<String> {
                Ok(String::new())
            }
        }
        QueryOrchestrator::new(index, Arc::new(NoopGateway), Settings::default())
    }

    fn scopes(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[tokio::test]
    async fn two_mentioned_years_mean_comparison() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent(
            "Why did the reasons differ in 2024 and 2023?",
            &scopes(&["2023", "2024"]),
        );
        assert_eq!(
            intent,
            QueryIntent::Comparative(scopes(&["2023", "2024"])),
            "labels sort ascending regardless of mention order"
        );
    }

    #[tokio::test]
    async fn comparison_language_widens_to_all_known_scopes() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent("Compare the two reports.", &scopes(&["2023", "2024"]));
        assert_eq!(intent, QueryIntent::Comparative(scopes(&["2023", "2024"])));
    }

    #[tokio::test]
    async fn single_mentioned_year_is_scoped() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent(
            "What did the 2023 report say about hunger?",
            &scopes(&["2023", "2024"]),
        );
        assert_eq!(intent, QueryIntent::Scoped("2023".to_string()));
    }

    #[tokio::test]
    async fn no_year_and_no_comparison_is_unscoped() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent("What are the main findings?", &scopes(&["2023", "2024"]));
        assert_eq!(intent, QueryIntent::Unscoped);
    }

    #[tokio::test]
    async fn comparison_over_a_single_scope_corpus_degrades() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent("Compare hunger levels.", &scopes(&["2024"]));
        assert_eq!(intent, QueryIntent::Unscoped);

        let intent = orch.detect_intent("Compare hunger levels in 2024.", &scopes(&["2024"]));
        assert_eq!(intent, QueryIntent::Scoped("2024".to_string()));
    }

    #[tokio::test]
    async fn year_tokens_match_on_word_boundaries_only() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path()).await;
        let intent = orch.detect_intent(
            "Is item 20233 in the catalogue?",
            &scopes(&["2023", "2024"]),
        );
        assert_eq!(intent, QueryIntent::Unscoped);
    }

    #[test]
    fn label_joining_reads_naturally() {
        assert_eq!(join_labels(&scopes(&["2023", "2024"])), "2023 and 2024");
        assert_eq!(
            join_labels(&scopes(&["2022", "2023", "2024"])),
            "2022, 2023 and 2024"
        );
    }
}
