//! Word-window splitting of extracted document text.
//!
//! The chunker turns one document's raw text into an ordered sequence of
//! bounded, overlapping passages — the unit of embedding and retrieval.
//! Splitting is purely lexical: whitespace tokenization, a character budget
//! per chunk, and a word-granular overlap carried between neighbours. The
//! same input and configuration always produce the same sequence.

use crate::types::{RagError, Result};

/// Splits raw text into overlapping, bounded chunks.
///
/// Words are never split: a chunk is flushed before the word that would push
/// its accumulated length (each word plus one separator) past `chunk_size`.
/// The next chunk starts with the trailing whole words of its predecessor,
/// up to `overlap` characters. A single word longer than `chunk_size`
/// becomes its own over-long chunk rather than being cut mid-word.
#[derive(Clone, Debug)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Creates a chunker, rejecting configurations that cannot make progress.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Splits `text` into ordered chunk strings.
    ///
    /// Blank input yields an empty sequence. Input shorter than the chunk
    /// budget yields exactly one whitespace-normalized chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for word in text.split_whitespace() {
            let add = word.len() + 1;

            if !current.is_empty() && current_len + add > self.chunk_size {
                chunks.push(current.join(" "));
                (current, current_len) = self.carry_overlap(&current);
                // The overlap seed itself must leave room for the new word.
                while !current.is_empty() && current_len + add > self.chunk_size {
                    let dropped = current.remove(0);
                    current_len -= dropped.len() + 1;
                }
            }

            current.push(word);
            current_len += add;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }
        chunks
    }

    /// Trailing whole words of `chunk` whose combined length fits the
    /// configured overlap.
    fn carry_overlap<'a>(&self, chunk: &[&'a str]) -> (Vec<&'a str>, usize) {
        if self.overlap == 0 {
            return (Vec::new(), 0);
        }
        let mut seeded: Vec<&str> = Vec::new();
        let mut seeded_len = 0usize;
        for word in chunk.iter().rev() {
            let add = word.len() + 1;
            if seeded_len + add > self.overlap {
                break;
            }
            seeded.push(word);
            seeded_len += add;
        }
        seeded.reverse();
        (seeded, seeded_len)
    }
}

/// Collapses whitespace runs into single spaces and trims the ends.
///
/// Extraction output tends to carry page-break artifacts and ragged line
/// endings; normalizing first keeps chunk boundaries stable across sources.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
