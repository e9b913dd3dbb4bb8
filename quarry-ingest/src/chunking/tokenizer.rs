//! Token counting for the chunker.

use anyhow::Result;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Trait for token counting.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in text.
    fn count_tokens(&self, text: &str) -> usize;

    /// Counter name, for logging.
    fn name(&self) -> &str;
}

/// BPE counter matching the OpenAI embedding models.
pub struct BpeTokenCounter {
    tokenizer: CoreBPE,
    name: String,
}

impl std::fmt::Debug for BpeTokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenCounter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BpeTokenCounter {
    /// Counter for an embedding model. Every current model uses
    /// `cl100k_base`; unknown models get it too.
    ///
    /// # Errors
    ///
    /// Fails if the encoder tables cannot be built.
    pub fn for_model(_model: &str) -> Result<Self> {
        Ok(Self {
            tokenizer: cl100k_base()?,
            name: "cl100k_base".to_string(),
        })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Character-estimate fallback, roughly four characters per token.
#[derive(Debug, Clone, Copy)]
pub struct CharTokenCounter;

impl TokenCounter for CharTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }

    fn name(&self) -> &str {
        "chars/4"
    }
}

/// Best available counter for a model.
#[must_use]
pub fn counter_for_model(model: &str) -> Box<dyn TokenCounter> {
    BpeTokenCounter::for_model(model).map_or_else(
        |_| Box::new(CharTokenCounter) as Box<dyn TokenCounter>,
        |counter| Box::new(counter) as Box<dyn TokenCounter>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_counter_estimate() {
        let counter = CharTokenCounter;
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("abcd"), 1);
        assert_eq!(counter.count_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_bpe_counter_counts_words() {
        let counter = BpeTokenCounter::for_model("text-embedding-3-small").unwrap();
        let count = counter.count_tokens("the quick brown fox jumps over the lazy dog");
        assert!(count >= 5);
        assert!(count <= 15);
    }
}
