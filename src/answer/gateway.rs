//! The external answer generator, reduced to one operation.
//!
//! The orchestrator never differentiates gateway failures — transport,
//! quota, and timeout all collapse to [`RagError::Generation`] and become
//! the fallback answer upstream. Adapters therefore stay deliberately thin.

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::types::{RagError, Result};

/// Sampling bounds for one completion call.
#[derive(Clone, Copy, Debug)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// Black-box completion function: system instruction + question in, text out.
#[async_trait]
pub trait AnswerGateway: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        question: &str,
        params: &GenerationParams,
    ) -> Result<String>;
}

/// rig-core OpenAI adapter.
///
/// Builds a fresh agent per call because the preamble (the grounding
/// context) changes with every question.
pub struct RigAnswerGateway {
    client: openai::Client,
    model: String,
}

impl RigAnswerGateway {
    pub fn new(client: openai::Client, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Reads the API key from the environment (`OPENAI_API_KEY`).
    pub fn from_env(model: impl Into<String>) -> Self {
        Self::new(openai::Client::from_env(), model)
    }
}

#[async_trait]
impl AnswerGateway for RigAnswerGateway {
    async fn complete(
        &self,
        system: &str,
        question: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .build();

        agent
            .prompt(question)
            .await
            .map_err(|err| RagError::Generation(err.to_string()))
    }
}
