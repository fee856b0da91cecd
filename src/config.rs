//! Pipeline configuration.
//!
//! All tunables live on [`Settings`]. Values resolve in two layers: compiled
//! defaults, then `ANSWERSMITH_*` environment variables (a `.env` file is
//! honored via `dotenvy`). Construct with [`Settings::default`] for tests and
//! embedding in a host process, or [`Settings::from_env`] at process start.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{RagError, Result};

/// Tunables for chunking, retrieval, caching, and generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum accumulated character length of a chunk.
    pub chunk_size: usize,
    /// Trailing characters of a chunk carried into its successor, at word
    /// granularity.
    pub chunk_overlap: usize,
    /// Items per embedding request during ingestion.
    pub embed_batch_size: usize,
    /// Retrieval depth per scope.
    pub top_k: usize,
    /// Cosine-distance cutoff; retrieved chunks farther than this are
    /// excluded from the grounding context.
    pub max_distance: f32,
    /// Directory holding persisted vector collections.
    pub persist_dir: PathBuf,
    /// Collection name; the store file is `<persist_dir>/<collection>.sqlite3`.
    pub collection: String,
    /// Cache store address, e.g. `redis://127.0.0.1:6379`. `None` selects the
    /// in-process memory store.
    pub cache_url: Option<String>,
    /// Time-to-live for cached answers.
    pub cache_ttl: Duration,
    /// Scope answered when a question names none. `None` falls back to the
    /// greatest known scope label (the most recent year).
    pub default_scope: Option<String>,
    /// Sampling temperature passed to the answer generator.
    pub temperature: f64,
    /// Output token bound passed to the answer generator.
    pub max_tokens: u64,
    /// Wall-clock bound on a single generation call.
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            embed_batch_size: 128,
            top_k: 5,
            max_distance: 0.8,
            persist_dir: PathBuf::from("./data"),
            collection: "report_chunks".to_string(),
            cache_url: None,
            cache_ttl: Duration::from_secs(3600),
            default_scope: None,
            temperature: 0.7,
            max_tokens: 500,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Resolves settings from the environment on top of the defaults.
    ///
    /// Recognized variables: `ANSWERSMITH_CHUNK_SIZE`,
    /// `ANSWERSMITH_CHUNK_OVERLAP`, `ANSWERSMITH_EMBED_BATCH_SIZE`,
    /// `ANSWERSMITH_TOP_K`, `ANSWERSMITH_MAX_DISTANCE`,
    /// `ANSWERSMITH_PERSIST_DIR`, `ANSWERSMITH_COLLECTION`,
    /// `ANSWERSMITH_CACHE_URL`, `ANSWERSMITH_CACHE_TTL_SECS`,
    /// `ANSWERSMITH_DEFAULT_SCOPE`, `ANSWERSMITH_TEMPERATURE`,
    /// `ANSWERSMITH_MAX_TOKENS`, `ANSWERSMITH_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let settings = Self {
            chunk_size: env_parse("ANSWERSMITH_CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: env_parse("ANSWERSMITH_CHUNK_OVERLAP", defaults.chunk_overlap)?,
            embed_batch_size: env_parse("ANSWERSMITH_EMBED_BATCH_SIZE", defaults.embed_batch_size)?,
            top_k: env_parse("ANSWERSMITH_TOP_K", defaults.top_k)?,
            max_distance: env_parse("ANSWERSMITH_MAX_DISTANCE", defaults.max_distance)?,
            persist_dir: std::env::var("ANSWERSMITH_PERSIST_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.persist_dir),
            collection: std::env::var("ANSWERSMITH_COLLECTION").unwrap_or(defaults.collection),
            cache_url: std::env::var("ANSWERSMITH_CACHE_URL").ok(),
            cache_ttl: Duration::from_secs(env_parse(
                "ANSWERSMITH_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            default_scope: std::env::var("ANSWERSMITH_DEFAULT_SCOPE").ok(),
            temperature: env_parse("ANSWERSMITH_TEMPERATURE", defaults.temperature)?,
            max_tokens: env_parse("ANSWERSMITH_MAX_TOKENS", defaults.max_tokens)?,
            request_timeout: Duration::from_secs(env_parse(
                "ANSWERSMITH_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field consistency. Called by [`from_env`](Self::from_env);
    /// call it explicitly when settings are assembled by hand.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be positive".into()));
        }
        if !(self.max_distance > 0.0) {
            return Err(RagError::Config("max_distance must be positive".into()));
        }
        Ok(())
    }

    /// Path of the persisted collection file.
    pub fn collection_path(&self) -> PathBuf {
        self.persist_dir.join(format!("{}.sqlite3", self.collection))
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| RagError::Config(format!("unable to parse {key}='{raw}': {err}"))),
        Err(_) => Ok(default),
    }
}
