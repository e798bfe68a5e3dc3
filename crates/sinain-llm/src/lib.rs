//! Sinain LLM - Chat-completion client with a retry-with-fallback model chain

pub mod chain;
pub mod chat;
pub mod types;

pub use chain::{ChainExhausted, ChainOutcome, ModelAttempt, ModelChain};
pub use chat::{ChatProvider, HttpChatClient, LlmError};
pub use types::*;
