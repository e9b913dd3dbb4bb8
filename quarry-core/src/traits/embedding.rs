//! Embedding model seam.

use crate::error::Result;
use async_trait::async_trait;

/// A model that turns text into fixed-dimension vectors.
///
/// The dimension is a property of the model and is pinned at configuration
/// load; the vector store rejects anything else.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed a batch of texts, preserving order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension.
    fn dimensions(&self) -> usize;

    /// Model identifier, recorded on every chunk.
    fn model_id(&self) -> &str;
}
