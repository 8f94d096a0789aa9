use crate::types::{ContentBlock, Message, ToolSpec};
use async_trait::async_trait;

/// Everything a provider needs for one model turn.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_prompt: &'a str,
    pub history: &'a [Message],
    pub tools: &'a [ToolSpec],
    /// Ask the provider to mark the system prompt as a cache breakpoint.
    pub prompt_caching: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    /// Connection failures and timeouts. The server never answered.
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider answered with something we could not interpret.
    #[error("Malformed model response: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Hard errors abort the run; the rest end it quietly with the history so far.
    pub fn is_hard(&self) -> bool {
        !matches!(self, ModelError::Network(_))
    }
}

impl From<ModelError> for ally_common::AllyError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Config(msg) => ally_common::AllyError::Config(msg),
            other => ally_common::AllyError::Model(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion and return the response content blocks in order.
    async fn complete(&self, request: ModelRequest<'_>) -> Result<Vec<ContentBlock>, ModelError>;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}
