//! LLM request/response types

use serde::{Deserialize, Serialize};

/// Chat-completion request.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One completed (non-streamed) model response with usage accounting.
#[derive(Clone, Debug, Default)]
pub struct ChatCompletion {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

// ── Wire shapes (OpenAI-compatible /chat/completions) ───────────────────

#[derive(Deserialize)]
pub(crate) struct CompletionsResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Deserialize)]
pub(crate) struct CompletionMessage {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub(crate) struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}
