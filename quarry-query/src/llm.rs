//! Chat-completion clients.
//!
//! [`HttpChatModel`] speaks the OpenAI chat-completions shape;
//! [`ScriptedChatModel`] serves canned answers for tests and offline
//! development. Both retry transient transport failures internally; the
//! pipeline owns the overall deadline.

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::error::{ExternalService, QuarryError, Result};
use quarry_core::traits::{ChatModel, ChatRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI-compatible chat client.
#[derive(Debug)]
pub struct HttpChatModel {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
    max_retries: u32,
    context_window: usize,
}

impl HttpChatModel {
    /// Build the client.
    ///
    /// # Errors
    ///
    /// Fails when the API key environment variable is unset.
    pub fn new(
        model: &str,
        api_key_env: &str,
        base_url: Option<String>,
        max_retries: u32,
    ) -> Result<Self> {
        let api_key = env::var(api_key_env).map_err(|_| QuarryError::BadRequest {
            message: format!("chat API key variable '{api_key_env}' is not set"),
        })?;
        Ok(Self {
            model: model.to_string(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            client: Client::new(),
            max_retries,
            context_window: 128_000,
        })
    }

    async fn request(&self, request: &ChatRequest) -> Result<String> {
        let mut messages = vec![WireMessage {
            role: "system".to_string(),
            content: request.system.clone(),
        }];
        messages.extend(request.turns.iter().map(|turn| WireMessage {
            role: turn.role.clone(),
            content: turn.content.clone(),
        }));

        let body = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                QuarryError::external(ExternalService::Llm, format!("chat request failed: {e}"), true)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.is_server_error() || status.as_u16() == 429;
            return Err(QuarryError::external(
                ExternalService::Llm,
                format!("chat endpoint returned {status}: {body}"),
                retryable,
            ));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            QuarryError::external(
                ExternalService::Llm,
                format!("chat response parse failed: {e}"),
                false,
            )
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                QuarryError::external(ExternalService::Llm, "chat response had no choices", false)
            })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request(request).await {
                Ok(content) => {
                    debug!(chars = content.len(), "chat completion");
                    return Ok(content);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(attempt, "chat call failed, backing off: {e}");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

/// Scripted model serving queued responses, then an echo of the last
/// user turn. `fail_always` turns every call into a retryable failure.
#[derive(Debug)]
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<String>>,
    fail_always: bool,
    context_window: usize,
}

impl ScriptedChatModel {
    /// Model that answers from a queue.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fail_always: false,
            context_window: 8192,
        }
    }

    /// Model whose every call fails, for degraded-path tests.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail_always: true,
            context_window: 8192,
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if self.fail_always {
            return Err(QuarryError::external(
                ExternalService::Llm,
                "scripted failure",
                false,
            ));
        }
        if let Some(next) = self.responses.lock().pop_front() {
            return Ok(next);
        }
        let last_user = request
            .turns
            .iter()
            .rev()
            .find(|t| t.role == "user")
            .map_or_else(String::new, |t| t.content.clone());
        Ok(format!("Answering from sources [1]: {last_user}"))
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn context_window(&self) -> usize {
        self.context_window
    }
}
