//! The tools an agent can call against a live page.
//!
//! [`registry::Toolbox`] owns the fixed tool set and routes model-issued
//! calls; [`computer::ComputerTool`] validates and translates the computer
//! actions into [`ally_drivers::BrowserDriver`] primitives.
pub mod computer;
pub mod cursor;
pub mod keys;
pub mod registry;

pub use computer::{ComputerAction, ComputerTool};
pub use registry::{Tool, Toolbox, ToolboxOptions};

/// Validation failure inside a tool. The message is shown to the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
