//! OpenAI-compatible embedding client.

use super::EmbeddingProviderConfig;
use async_trait::async_trait;
use quarry_core::error::{ExternalService, QuarryError, Result};
use quarry_core::traits::EmbeddingModel;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Embedding model backed by an `/embeddings` HTTP endpoint.
#[derive(Debug)]
pub struct HttpEmbeddingModel {
    model: String,
    dimensions: usize,
    api_key: String,
    base_url: String,
    client: Client,
    max_retries: u32,
}

impl HttpEmbeddingModel {
    /// Build the client from provider configuration.
    ///
    /// # Errors
    ///
    /// Fails when the API key environment variable is unset.
    pub fn new(config: &EmbeddingProviderConfig) -> Result<Self> {
        let api_key_env = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = env::var(api_key_env).map_err(|_| QuarryError::BadRequest {
            message: format!("embedding API key variable '{api_key_env}' is not set"),
        })?;

        Ok(Self {
            model: config.model.clone(),
            dimensions: config.dimensions,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            client: Client::new(),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
            dimensions: Some(self.dimensions),
            encoding_format: "float",
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                QuarryError::external(
                    ExternalService::Embedding,
                    format!("embedding request failed: {e}"),
                    true,
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 5xx and 429 are worth retrying, the rest are terminal.
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(QuarryError::external(
                ExternalService::Embedding,
                format!("embedding endpoint returned {status}: {body}"),
                retryable,
            ));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            QuarryError::external(
                ExternalService::Embedding,
                format!("embedding response parse failed: {e}"),
                false,
            )
        })?;

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.request(texts).await {
                Ok(vectors) => {
                    debug!(count = vectors.len(), "embedded batch");
                    return Ok(vectors);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(attempt, "embedding call failed, backing off: {e}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProviderKind;

    #[test]
    fn test_missing_api_key_is_a_config_error() {
        let config = EmbeddingProviderConfig {
            provider: EmbeddingProviderKind::OpenAi,
            api_key_env: Some("QUARRY_TEST_MISSING_KEY".to_string()),
            ..EmbeddingProviderConfig::default()
        };
        assert!(HttpEmbeddingModel::new(&config).is_err());
    }

    #[test]
    fn test_key_from_environment() {
        env::set_var("QUARRY_TEST_EMBED_KEY", "test-key");
        let config = EmbeddingProviderConfig {
            provider: EmbeddingProviderKind::OpenAi,
            api_key_env: Some("QUARRY_TEST_EMBED_KEY".to_string()),
            dimensions: 256,
            ..EmbeddingProviderConfig::default()
        };
        let model = HttpEmbeddingModel::new(&config).unwrap();
        assert_eq!(model.dimensions(), 256);
        assert_eq!(model.model_id(), "text-embedding-3-small");
        env::remove_var("QUARRY_TEST_EMBED_KEY");
    }
}
