//! External text generation.
//!
//! Analysis and chat talk to the model only through [`TextGenerator`], so
//! tests can substitute a scripted implementation for the HTTP client.

pub mod anthropic;
#[cfg(test)]
pub(crate) mod testing;

pub use anthropic::AnthropicClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{ChatRole, TokenUsage};

#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<PromptMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Request to model API failed: {0}")]
    Transport(String),

    #[error("Model API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed model API response: {0}")]
    MalformedResponse(String),

    #[error("Model API returned no text content")]
    EmptyResponse,

    #[error("No model API key configured")]
    MissingApiKey,
}

impl LlmError {
    /// Whether a later attempt might succeed: network failures, rate
    /// limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::MalformedResponse(_) | LlmError::EmptyResponse | LlmError::MissingApiKey => {
                false
            }
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError>;
}
