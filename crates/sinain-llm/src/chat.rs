//! Chat-completion HTTP client
//!
//! Non-streaming POST against an OpenAI-compatible `/chat/completions`
//! endpoint. Every call carries a hard timeout; a timed-out call is fatal
//! to that attempt, never to the caller's loop.

use crate::types::{ChatCompletion, ChatRequest, CompletionsResponse};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::NetworkError(err.to_string())
        }
    }
}

/// Chat-completion provider seam. The HTTP client is the production
/// implementation; tests substitute scripted providers.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError>;
}

pub struct HttpChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ChatProvider for HttpChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        debug!(model = %request.model, "chat-completion request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "chat-completion error: {}", error_text);
            return match status.as_u16() {
                401 | 403 => Err(LlmError::AuthFailed(error_text)),
                429 => Err(LlmError::RateLimited),
                _ => Err(LlmError::RequestFailed(format!("{}: {}", status, error_text))),
            };
        }

        let body: CompletionsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;

        let usage = body.usage.unwrap_or(crate::types::CompletionUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(ChatCompletion {
            text,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        })
    }
}
