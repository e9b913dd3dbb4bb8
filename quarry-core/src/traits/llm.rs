//! Chat completion seam.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One turn of conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// `user` or `assistant`.
    pub role: String,
    /// Turn text.
    pub content: String,
}

impl ChatTurn {
    /// A user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// An assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A synthesis request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System prompt from the domain configuration.
    pub system: String,
    /// Conversation history plus the current user message, oldest first.
    pub turns: Vec<ChatTurn>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Response token ceiling.
    pub max_tokens: usize,
}

/// A model that completes a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the assistant's next turn. Callers wrap this in their own
    /// deadline; implementations retry transient transport failures.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Model identifier.
    fn model_id(&self) -> &str;

    /// Context window in tokens, used to budget retrieval context.
    fn context_window(&self) -> usize;
}
