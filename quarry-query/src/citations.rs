//! Citation handling.
//!
//! Retrieved runs become a numbered source block the model is prompted
//! with; the model's `[n]` markers are validated against that numbering
//! afterwards. A marker the pipeline never issued is stripped, so an
//! answer can only ever cite sources the pipeline actually saw. An answer
//! whose prose carries no surviving citation is flagged low-confidence.

use crate::retrieval::RetrievedChunk;
use quarry_core::types::SourceCitation;
use regex::Regex;
use std::sync::LazyLock;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3})\]").expect("static pattern"));

/// Render the numbered source block for the synthesis prompt.
#[must_use]
pub fn source_block(chunks: &[RetrievedChunk]) -> String {
    let mut block = String::from("Sources:\n");
    for (i, chunk) in chunks.iter().enumerate() {
        block.push_str(&format!("[{}] {}\n\n", i + 1, chunk.text.trim()));
    }
    block
}

/// Result of validating an answer's markers.
#[derive(Debug, Clone)]
pub struct CitedAnswer {
    /// Answer text with invalid markers removed.
    pub content: String,
    /// Citations for the markers that survived, ordered by marker.
    pub citations: Vec<SourceCitation>,
    /// No factual sentence carried a citation.
    pub uncited: bool,
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    let mut cut = trimmed.len().min(160);
    while cut < trimmed.len() && !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    trimmed[..cut].to_string()
}

/// Validate `[n]` markers against the retrieval set.
#[must_use]
pub fn validate(answer: &str, sources: &[RetrievedChunk]) -> CitedAnswer {
    let mut used = vec![false; sources.len()];

    let content = MARKER
        .replace_all(answer, |caps: &regex::Captures<'_>| {
            let marker: usize = caps[1].parse().unwrap_or(0);
            if marker >= 1 && marker <= sources.len() {
                used[marker - 1] = true;
                caps[0].to_string()
            } else {
                // A marker the pipeline never issued is dropped.
                String::new()
            }
        })
        .to_string();

    let citations: Vec<SourceCitation> = used
        .iter()
        .enumerate()
        .filter(|(_, used)| **used)
        .map(|(i, _)| SourceCitation {
            marker: i + 1,
            document_id: sources[i].document_id,
            chunk_id: sources[i].chunk_id,
            chunk_index: sources[i].chunk_index,
            score: sources[i].score,
            snippet: snippet(&sources[i].text),
        })
        .collect();

    // Factual-claim heuristic: prose sentences of substance. If none of
    // them carries a marker, the answer is uncited.
    let has_factual_sentence = content
        .split(['.', '!', '?'])
        .any(|s| s.trim().split_whitespace().count() >= 4);
    let uncited = citations.is_empty() && has_factual_sentence && !sources.is_empty();

    CitedAnswer {
        content,
        citations,
        uncited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::ids::{ChunkId, DocumentId};

    fn sources(n: usize) -> Vec<RetrievedChunk> {
        (0..n)
            .map(|i| RetrievedChunk {
                document_id: DocumentId::new(),
                chunk_id: ChunkId::new(),
                chunk_index: i,
                text: format!("source text {i}"),
                score: 0.9,
            })
            .collect()
    }

    #[test]
    fn test_valid_markers_become_citations() {
        let sources = sources(3);
        let cited = validate("Uploads retry on failure [1]. Timeouts are configurable [3].", &sources);

        assert_eq!(cited.citations.len(), 2);
        assert_eq!(cited.citations[0].marker, 1);
        assert_eq!(cited.citations[1].marker, 3);
        assert_eq!(cited.citations[1].document_id, sources[2].document_id);
        assert!(!cited.uncited);
    }

    #[test]
    fn test_hallucinated_marker_is_stripped() {
        let sources = sources(2);
        let cited = validate("A claim with a made-up source [7].", &sources);

        assert!(!cited.content.contains("[7]"));
        assert!(cited.citations.is_empty());
        assert!(cited.uncited);
    }

    #[test]
    fn test_no_sources_means_not_flagged() {
        let cited = validate("Nothing was retrieved for this one.", &[]);
        assert!(cited.citations.is_empty());
        assert!(!cited.uncited);
    }

    #[test]
    fn test_source_block_numbering() {
        let block = source_block(&sources(2));
        assert!(block.contains("[1] source text 0"));
        assert!(block.contains("[2] source text 1"));
    }
}
