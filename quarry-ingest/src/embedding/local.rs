//! Deterministic in-process embedding model.
//!
//! Vectors are derived from token hashes, so equal texts always embed
//! equally and related texts overlap. Good enough to exercise the whole
//! pipeline in tests and offline development; not a semantic model.

use async_trait::async_trait;
use quarry_core::error::Result;
use quarry_core::traits::EmbeddingModel;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash-based embedding model with a fixed dimension.
#[derive(Debug)]
pub struct DeterministicEmbeddingModel {
    model: String,
    dimensions: usize,
}

impl DeterministicEmbeddingModel {
    /// Model with the given identity and dimension.
    #[must_use]
    pub fn new(model: &str, dimensions: usize) -> Self {
        Self {
            model: model.to_string(),
            dimensions: dimensions.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let index = usize::try_from(h % self.dimensions as u64).unwrap_or(0);
            // Each token bumps one component; direction varies by hash so
            // distinct vocabularies point different ways.
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            // Empty text still needs a valid vector.
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for DeterministicEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
