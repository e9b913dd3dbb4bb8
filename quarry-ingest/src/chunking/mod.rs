//! Document chunking.
//!
//! A sliding window over the text, sized in tokens with a configurable
//! overlap, respecting sentence boundaries. Chunk indices increase
//! monotonically and every chunk carries a content hash, which is the
//! embedding-cache key and the restart-safety marker.

pub mod tokenizer;

use quarry_core::hash::text_hash;
use serde::{Deserialize, Serialize};
use tokenizer::TokenCounter;

/// Chunker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens.
    pub target_tokens: usize,
    /// Overlap carried between neighbouring chunks.
    pub overlap_tokens: usize,
    /// Chunks below this size are merged into their predecessor unless
    /// they are the only chunk.
    pub min_tokens: usize,
    /// Prefer cutting at sentence ends.
    pub respect_sentences: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 512,
            overlap_tokens: 64,
            min_tokens: 32,
            respect_sentences: true,
        }
    }
}

/// One chunk of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Token count under the configured counter.
    pub token_count: usize,
    /// sha256 of the text, hex encoded.
    pub content_hash: String,
}

/// Sliding-window chunker.
pub struct TextChunker {
    config: ChunkingConfig,
    counter: Box<dyn TokenCounter>,
}

impl std::fmt::Debug for TextChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChunker")
            .field("config", &self.config)
            .field("counter", &self.counter.name())
            .finish()
    }
}

fn find_sentence_boundary(text: &str, start: usize, max_pos: usize) -> usize {
    let limit = max_pos.min(text.len());
    let search = &text[start..limit];

    for (i, ch) in search.char_indices().rev() {
        if matches!(ch, '.' | '!' | '?' | '\n') {
            let candidate = start + i + ch.len_utf8();
            if candidate >= text.len()
                || text[candidate..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace)
                || ch == '\n'
            {
                // Never produce an empty cut.
                if candidate > start {
                    return candidate;
                }
            }
        }
    }
    limit
}

fn char_floor(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl TextChunker {
    /// Chunker with an explicit token counter.
    #[must_use]
    pub fn new(config: ChunkingConfig, counter: Box<dyn TokenCounter>) -> Self {
        Self { config, counter }
    }

    /// Chunker with the best counter for an embedding model.
    #[must_use]
    pub fn for_model(config: ChunkingConfig, model: &str) -> Self {
        Self::new(config, tokenizer::counter_for_model(model))
    }

    /// Token count of arbitrary text under this chunker's counter.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count_tokens(text)
    }

    /// Split text into chunks with monotonically increasing indices.
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        // Byte estimate for the token target; refined per chunk by the
        // counter afterwards.
        let bytes_per_token = 4;
        let window_bytes = self.config.target_tokens * bytes_per_token;
        let overlap_bytes = self.config.overlap_tokens * bytes_per_token;

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut position = 0;
        let mut index = 0;

        while position < text.len() {
            let estimated_end = char_floor(text, position + window_bytes);
            let end = if self.config.respect_sentences && estimated_end < text.len() {
                find_sentence_boundary(text, position, estimated_end)
            } else {
                estimated_end
            };
            let end = if end <= position {
                char_floor(text, position + window_bytes).max(position + 1)
            } else {
                end
            };
            let end = char_floor(text, end).max(position + 1);

            let piece = text[position..end].trim();
            if !piece.is_empty() {
                let token_count = self.counter.count_tokens(piece);
                if token_count < self.config.min_tokens && end < text.len() {
                    // Too small to stand alone mid-document; extend to the
                    // plain window instead of the sentence cut.
                    let extended_end = char_floor(text, position + window_bytes).max(end);
                    let piece = text[position..extended_end].trim();
                    chunks.push(Chunk {
                        chunk_index: index,
                        text: piece.to_string(),
                        token_count: self.counter.count_tokens(piece),
                        content_hash: text_hash(piece),
                    });
                    index += 1;
                    position = Self::advance(extended_end, overlap_bytes, position, text);
                    continue;
                }
                chunks.push(Chunk {
                    chunk_index: index,
                    text: piece.to_string(),
                    token_count,
                    content_hash: text_hash(piece),
                });
                index += 1;
            }

            if end >= text.len() {
                break;
            }
            position = Self::advance(end, overlap_bytes, position, text);
        }

        chunks
    }

    fn advance(end: usize, overlap_bytes: usize, previous: usize, text: &str) -> usize {
        let next = char_floor(text, end.saturating_sub(overlap_bytes));
        // Overlap must never stall the walk.
        if next <= previous {
            end
        } else {
            next
        }
    }
}
