//! Grounding-context assembly and the generation system instruction.
//!
//! One convention rules scoring here: cosine distance, lower is better, with
//! `max_distance` as the exclusion cutoff. Results are presented best-match
//! first, each chunk prefixed by a bracketed provenance tag the model is
//! instructed to cite.

use std::cmp::Ordering;

use crate::index::RetrievalResult;
use crate::stores::ChunkMetadata;

/// Human-readable provenance for one retrieved chunk.
pub fn provenance_tag(metadata: &ChunkMetadata) -> String {
    match &metadata.scope {
        Some(scope) => format!(
            "[source: {} | chunk: {} | scope: {}]",
            metadata.source, metadata.chunk_index, scope
        ),
        None => format!("[source: {} | chunk: {}]", metadata.source, metadata.chunk_index),
    }
}

/// Builds the grounding context from retrieval results.
///
/// Results farther than `max_distance` are dropped; the survivors are sorted
/// ascending by distance (best first) and joined by blank lines, each
/// prefixed with its provenance tag. An empty return is legitimate — the
/// system instruction tells the model to own up to missing information.
pub fn assemble_context(results: &[RetrievalResult], max_distance: f32) -> String {
    let mut kept: Vec<&RetrievalResult> = results
        .iter()
        .filter(|result| result.distance <= max_distance)
        .collect();
    kept.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
    });

    kept.iter()
        .map(|result| format!("{}\n{}", provenance_tag(&result.metadata), result.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// System instruction restricting the model to the supplied context.
pub fn system_instruction(context: &str) -> String {
    format!(
        "You are a helpful assistant that answers questions based on the provided context.\n\
         Use ONLY the information from the context to answer questions. If the context doesn't\n\
         contain enough information to answer fully, acknowledge what you don't know.\n\
         When referring to information, cite the bracketed provenance tags.\n\
         \n\
         Context information:\n\
         {context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(source: &str, index: usize, scope: Option<&str>, content: &str, distance: f32) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                chunk_index: index,
                scope: scope.map(str::to_string),
            },
            distance,
            relevance: 1.0 / (1.0 + distance),
        }
    }

    #[test]
    fn tags_carry_source_chunk_and_scope() {
        let with_scope = result("r.pdf", 3, Some("2024"), "text", 0.1);
        assert_eq!(
            provenance_tag(&with_scope.metadata),
            "[source: r.pdf | chunk: 3 | scope: 2024]"
        );
        let without = result("r.pdf", 3, None, "text", 0.1);
        assert_eq!(provenance_tag(&without.metadata), "[source: r.pdf | chunk: 3]");
    }

    #[test]
    fn context_sorts_best_match_first_and_filters_by_distance() {
        let results = vec![
            result("a", 0, None, "middling", 0.5),
            result("b", 1, None, "closest", 0.1),
            result("c", 2, None, "too far", 0.95),
        ];
        let context = assemble_context(&results, 0.8);
        let closest = context.find("closest").unwrap();
        let middling = context.find("middling").unwrap();
        assert!(closest < middling, "best match must come first");
        assert!(!context.contains("too far"));
    }

    #[test]
    fn chunks_are_separated_by_blank_lines() {
        let results = vec![
            result("a", 0, None, "first", 0.1),
            result("a", 1, None, "second", 0.2),
        ];
        let context = assemble_context(&results, 0.8);
        assert_eq!(context.matches("\n\n").count(), 1);
    }

    #[test]
    fn cutoff_is_inclusive() {
        let results = vec![result("a", 0, None, "edge", 0.8)];
        assert!(assemble_context(&results, 0.8).contains("edge"));
    }

    #[test]
    fn empty_results_yield_an_empty_context() {
        assert!(assemble_context(&[], 0.8).is_empty());
        let instruction = system_instruction("");
        assert!(instruction.contains("Context information:"));
    }
}
