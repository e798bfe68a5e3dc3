//! Model chain — walk `[primary, ...fallbacks]` until one model answers
//!
//! Any attempt failure (non-2xx, timeout, network) moves to the next model
//! in the chain. Exhausting the chain is the only way a tick's model call
//! fails.

use crate::chat::ChatProvider;
use crate::types::{ChatCompletion, ChatMessage, ChatRequest};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// One attempted model call, successful or not. The tick trace records a
/// span per attempt.
#[derive(Clone, Debug)]
pub struct ModelAttempt {
    pub model: String,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// The chain's overall outcome: which model answered, what it said, and
/// every attempt made along the way (failures first, the success last).
#[derive(Debug)]
pub struct ChainOutcome {
    pub model: String,
    pub completion: ChatCompletion,
    pub attempts: Vec<ModelAttempt>,
}

pub struct ModelChain {
    provider: Arc<dyn ChatProvider>,
    models: Vec<String>,
    max_tokens: u32,
    temperature: f32,
}

impl ModelChain {
    pub fn new(provider: Arc<dyn ChatProvider>, models: Vec<String>) -> Self {
        Self {
            provider,
            models,
            max_tokens: 512,
            temperature: 0.3,
        }
    }

    pub fn with_limits(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Try each model in order. Returns the first success together with the
    /// attempt log; `Err` means the whole chain was exhausted.
    pub async fn run(&self, messages: Vec<ChatMessage>) -> Result<ChainOutcome, ChainExhausted> {
        let mut attempts = Vec::new();

        for model in &self.models {
            let request = ChatRequest {
                model: model.clone(),
                messages: messages.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            let start = Instant::now();
            match self.provider.complete(request).await {
                Ok(completion) => {
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    });
                    return Ok(ChainOutcome {
                        model: model.clone(),
                        completion,
                        attempts,
                    });
                }
                Err(err) => {
                    warn!(model = %model, error = %err, "model attempt failed, walking chain");
                    attempts.push(ModelAttempt {
                        model: model.clone(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Err(ChainExhausted { attempts })
    }
}

/// Every model in the chain failed.
#[derive(Debug)]
pub struct ChainExhausted {
    pub attempts: Vec<ModelAttempt>,
}

impl std::fmt::Display for ChainExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = self
            .attempts
            .last()
            .and_then(|attempt| attempt.error.as_deref())
            .unwrap_or("no models configured");
        write!(
            f,
            "all {} models failed, last error: {}",
            self.attempts.len(),
            last
        )
    }
}

impl std::error::Error for ChainExhausted {}
