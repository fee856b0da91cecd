//! Turning extracted documents into index-ready chunk inputs.
//!
//! Text extraction itself (PDF parsing, upload handling) happens outside the
//! pipeline; this module picks up at the raw-text boundary. A [`Document`] is
//! immutable once ingested — corrections require a collection reset and full
//! re-ingest.

use serde::{Deserialize, Serialize};

use crate::chunking::{Chunker, normalize_whitespace};
use crate::stores::ChunkMetadata;

/// One extracted document queued for ingestion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Source name (file name or similar identifier).
    pub source: String,
    /// Raw extracted text.
    pub text: String,
    /// Corpus subset label, e.g. a report year.
    pub scope: Option<String>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

/// Chunk text plus provenance, ready for embedding and insertion.
#[derive(Clone, Debug)]
pub struct ChunkInput {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Outcome of ingesting one document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub source: String,
    /// Chunks embedded and persisted.
    pub chunks_written: usize,
    /// Chunks dropped before embedding (blank after normalization).
    pub skipped: usize,
}

/// Splits a document into ordered chunk inputs.
///
/// Returns the inputs and the number of blank chunks skipped. Chunk indices
/// count only the surviving chunks, so stored indices stay contiguous.
pub fn split_document(chunker: &Chunker, document: &Document) -> (Vec<ChunkInput>, usize) {
    let normalized = normalize_whitespace(&document.text);
    let mut inputs = Vec::new();
    let mut skipped = 0usize;

    for piece in chunker.split(&normalized) {
        if piece.trim().is_empty() {
            skipped += 1;
            continue;
        }
        inputs.push(ChunkInput {
            metadata: ChunkMetadata {
                source: document.source.clone(),
                chunk_index: inputs.len(),
                scope: document.scope.clone(),
            },
            content: piece,
        });
    }
    (inputs, skipped)
}
