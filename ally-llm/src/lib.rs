//! Model integration for Ally.
//!
//! This crate owns the conversation data model ([`types`]), the provider
//! agnostic [`traits::ModelClient`] interface, the Anthropic Messages adapter,
//! and the history helpers the sampling loop runs before every model turn
//! ([`context`]). [`transcript`] flattens a finished run for export.
//!
//! # Examples
//! ```no_run
//! use ally_llm::anthropic::{AnthropicClient, ANTHROPIC_API_BASE};
//! use ally_llm::traits::{ModelClient, ModelRequest};
//! use ally_llm::types::Message;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ally_llm::traits::ModelError> {
//! let client = AnthropicClient::new(ANTHROPIC_API_BASE, "sk-...", "claude-3-5-sonnet-20241022")?;
//! let history = vec![Message::user_text("Say hi")];
//! let blocks = client
//!     .complete(ModelRequest {
//!         system_prompt: "Be brief.",
//!         history: &history,
//!         tools: &[],
//!         prompt_caching: false,
//!     })
//!     .await?;
//! assert!(!blocks.is_empty());
//! # Ok(())
//! # }
//! ```
pub mod anthropic;
pub mod context;
pub mod prompt;
pub mod traits;
pub mod transcript;
pub mod types;

pub use anthropic::AnthropicClient;
pub use traits::{ModelClient, ModelError, ModelRequest};
