//! Embedding generation.
//!
//! A provider config picks between the OpenAI-compatible HTTP client and
//! the deterministic local model (tests and offline development). Results
//! are cached content-addressed by `(content_hash, model_id)`, so a
//! restarted ingestion worker never pays twice for the same chunk.

mod cache;
mod http;
mod local;

pub use cache::{CacheStats, EmbeddingCache, EmbeddingCacheConfig};
pub use http::HttpEmbeddingModel;
pub use local::DeterministicEmbeddingModel;

use quarry_core::error::Result;
use quarry_core::traits::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Supported embedding providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible HTTP endpoint.
    OpenAi,
    /// Deterministic in-process model.
    Local,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    /// Provider to use.
    pub provider: EmbeddingProviderKind,
    /// Model identifier.
    pub model: String,
    /// Output dimension; enforced downstream by the vector store.
    pub dimensions: usize,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    /// Endpoint override.
    pub base_url: Option<String>,
    /// Batch ceiling per request.
    pub max_batch_size: usize,
    /// Transport retry budget.
    pub max_retries: u32,
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            base_url: None,
            max_batch_size: 100,
            max_retries: 3,
        }
    }
}

/// Build the configured embedding model.
///
/// # Errors
///
/// Fails when provider configuration is incomplete, e.g. a missing API
/// key variable.
pub fn build_model(config: &EmbeddingProviderConfig) -> Result<Arc<dyn EmbeddingModel>> {
    match config.provider {
        EmbeddingProviderKind::OpenAi => {
            Ok(Arc::new(HttpEmbeddingModel::new(config)?) as Arc<dyn EmbeddingModel>)
        }
        EmbeddingProviderKind::Local => Ok(Arc::new(DeterministicEmbeddingModel::new(
            &config.model,
            config.dimensions,
        )) as Arc<dyn EmbeddingModel>),
    }
}

/// Embed texts through the cache: hits are reused, misses go to the model
/// in batches, and fresh vectors are written back.
///
/// Returned vectors line up with `texts` by position.
///
/// # Errors
///
/// Propagates model failures after the model's own retries.
pub async fn embed_cached(
    model: &Arc<dyn EmbeddingModel>,
    cache: &EmbeddingCache,
    texts: &[String],
    max_batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    let mut miss_indices = Vec::new();

    for (i, text) in texts.iter().enumerate() {
        let key = quarry_core::hash::text_hash(text);
        if let Some(vector) = cache.get(&key, model.model_id()) {
            out[i] = Some(vector);
        } else {
            miss_indices.push(i);
        }
    }

    for batch in miss_indices.chunks(max_batch_size.max(1)) {
        let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
        let vectors = model.embed(&batch_texts).await?;
        for (&i, vector) in batch.iter().zip(vectors.into_iter()) {
            let key = quarry_core::hash::text_hash(&texts[i]);
            cache.put(&key, model.model_id(), vector.clone());
            out[i] = Some(vector);
        }
    }

    Ok(out.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_cached_reuses_hits() {
        let config = EmbeddingProviderConfig {
            provider: EmbeddingProviderKind::Local,
            model: "local-test".to_string(),
            dimensions: 16,
            ..EmbeddingProviderConfig::default()
        };
        let model = build_model(&config).unwrap();
        let cache = EmbeddingCache::new(EmbeddingCacheConfig::default());

        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let first = embed_cached(&model, &cache, &texts, 10).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].len(), 16);

        let again = embed_cached(&model, &cache, &texts, 10).await.unwrap();
        assert_eq!(first, again);

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
    }
}
