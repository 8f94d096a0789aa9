use crate::computer::ComputerTool;
use ally_common::{Viewport, WaitUntil};
use ally_drivers::BrowserDriver;
use ally_llm::types::{ContentBlock, ToolKind, ToolResult, ToolSpec};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// The fixed set of tools offered to the model, in the order they are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Computer,
    SetUrl,
    PreviousPage,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Computer, Tool::SetUrl, Tool::PreviousPage];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Computer => "computer",
            Tool::SetUrl => "set_url",
            Tool::PreviousPage => "previous_page",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn spec(&self, viewport: Viewport) -> ToolSpec {
        match self {
            Tool::Computer => ToolSpec {
                name: self.name().to_string(),
                description: String::new(),
                input_schema: json!({}),
                kind: ToolKind::Computer {
                    display_width_px: viewport.width,
                    display_height_px: viewport.height,
                    display_number: 1,
                },
            },
            Tool::SetUrl => ToolSpec {
                name: self.name().to_string(),
                description: "This tool allows to go directly to a specified URL.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "URL of the web page to navigate to."
                        }
                    },
                    "required": ["url"]
                }),
                kind: ToolKind::Function,
            },
            Tool::PreviousPage => ToolSpec {
                name: self.name().to_string(),
                description: "This tool navigate to the previous page.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                }),
                kind: ToolKind::Function,
            },
        }
    }

    pub async fn invoke(&self, toolbox: &mut Toolbox, input: &Value) -> ToolResult {
        match self {
            Tool::Computer => toolbox.computer.call(input).await,
            Tool::SetUrl => {
                let Some(url) = input.get("url").and_then(Value::as_str) else {
                    return ToolResult::error(
                        "Error executing tool 'set_url': missing string parameter 'url'. Please try again with correct parameters.",
                    );
                };
                match toolbox.driver.goto(url).await {
                    Ok(()) => ToolResult::default(),
                    Err(e) => ToolResult::error(format!(
                        "Failed to navigate to URL: {e}. Please check the URL format and try again."
                    )),
                }
            }
            Tool::PreviousPage => match toolbox.driver.go_back().await {
                Ok(()) => ToolResult::default(),
                Err(e) => ToolResult::error(format!(
                    "Failed to navigate to previous page: {e}. This may happen if there's no previous page in the browser history."
                )),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ToolboxOptions {
    pub viewport: Viewport,
    pub use_cursor: bool,
    pub screenshot_wait_until: Option<WaitUntil>,
}

impl Default for ToolboxOptions {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            use_cursor: true,
            screenshot_wait_until: None,
        }
    }
}

/// Tools bound to one page, plus dispatch of model tool calls.
pub struct Toolbox {
    driver: Arc<dyn BrowserDriver>,
    computer: ComputerTool,
    viewport: Viewport,
}

impl Toolbox {
    pub fn new(driver: Arc<dyn BrowserDriver>, options: ToolboxOptions) -> Self {
        let computer = ComputerTool::new(
            driver.clone(),
            options.viewport,
            options.use_cursor,
            options.screenshot_wait_until,
        );
        Self {
            driver,
            computer,
            viewport: options.viewport,
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        Tool::ALL.iter().map(|t| t.spec(self.viewport)).collect()
    }

    pub fn computer(&self) -> &ComputerTool {
        &self.computer
    }

    /// Run the tool called `name` and wrap its outcome as the tool-result block
    /// answering `tool_use_id`. Unknown names produce an error result.
    pub async fn run_tool(&mut self, name: &str, input: &Value, tool_use_id: &str) -> ContentBlock {
        let result = match Tool::from_name(name) {
            Some(tool) => {
                let result = tool.invoke(self, input).await;
                info!(
                    target: "agent.tools",
                    tool = name,
                    %tool_use_id,
                    is_error = result.is_error(),
                    has_image = result.base64_image.is_some(),
                    "tool finished"
                );
                result
            }
            None => {
                warn!(target: "agent.tools", tool = name, %tool_use_id, "unknown tool");
                ToolResult::error(format!(
                    "Unknown tool '{name}'. Please try a valid tool: computer, set_url, or previous_page."
                ))
            }
        };
        ContentBlock::tool_result(tool_use_id, result)
    }
}
