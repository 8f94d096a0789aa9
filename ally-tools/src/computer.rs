//! The `computer` tool: validates a model-issued action and performs it.
//!
//! Every call ends in a [`ToolResult`]. Validation problems become an error
//! result suffixed with a retry hint; driver failures become an "unexpected
//! error" result. Nothing escapes as a Rust error.
use crate::cursor::render_frame;
use crate::keys::KeyChord;
use crate::ToolError;
use ally_common::{Viewport, WaitUntil};
use ally_drivers::{BrowserDriver, MouseButton};
use ally_llm::types::ToolResult;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters typed per driver call.
pub const TYPING_GROUP_SIZE: usize = 50;

const RETRY_HINT: &str = "Please try again with a valid command.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputerAction {
    Key,
    Type,
    MouseMove,
    LeftClick,
    LeftClickDrag,
    RightClick,
    MiddleClick,
    DoubleClick,
    Screenshot,
    CursorPosition,
}

impl ComputerAction {
    pub const ALL: [ComputerAction; 10] = [
        ComputerAction::Key,
        ComputerAction::Type,
        ComputerAction::MouseMove,
        ComputerAction::LeftClick,
        ComputerAction::LeftClickDrag,
        ComputerAction::RightClick,
        ComputerAction::MiddleClick,
        ComputerAction::DoubleClick,
        ComputerAction::Screenshot,
        ComputerAction::CursorPosition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputerAction::Key => "key",
            ComputerAction::Type => "type",
            ComputerAction::MouseMove => "mouse_move",
            ComputerAction::LeftClick => "left_click",
            ComputerAction::LeftClickDrag => "left_click_drag",
            ComputerAction::RightClick => "right_click",
            ComputerAction::MiddleClick => "middle_click",
            ComputerAction::DoubleClick => "double_click",
            ComputerAction::Screenshot => "screenshot",
            ComputerAction::CursorPosition => "cursor_position",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }

    fn takes_coordinate(&self) -> bool {
        matches!(
            self,
            ComputerAction::MouseMove
                | ComputerAction::LeftClick
                | ComputerAction::LeftClickDrag
                | ComputerAction::RightClick
                | ComputerAction::MiddleClick
                | ComputerAction::DoubleClick
        )
    }

    /// `(button, click count)` for the click actions.
    fn click(&self) -> Option<(MouseButton, u32)> {
        match self {
            ComputerAction::LeftClick => Some((MouseButton::Left, 1)),
            ComputerAction::RightClick => Some((MouseButton::Right, 1)),
            ComputerAction::MiddleClick => Some((MouseButton::Middle, 1)),
            ComputerAction::DoubleClick => Some((MouseButton::Left, 2)),
            _ => None,
        }
    }
}

/// Alphabetical list of action names, as quoted in error messages.
pub fn valid_actions() -> String {
    let mut names: Vec<&str> = ComputerAction::ALL.iter().map(|a| a.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

/// A validated action ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Move { x: u32, y: u32 },
    Click { x: u32, y: u32, button: MouseButton, count: u32 },
    Drag,
    Key { chord: KeyChord, text: String },
    Type(String),
    Screenshot,
    CursorPosition,
}

enum Failure {
    Invalid(ToolError),
    Driver(anyhow::Error),
}

impl From<ToolError> for Failure {
    fn from(e: ToolError) -> Self {
        Failure::Invalid(e)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(e: anyhow::Error) -> Self {
        Failure::Driver(e)
    }
}

/// Split `text` into pieces of at most `size` characters.
pub fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `null` counts as absent.
fn param<'a>(input: &'a Value, name: &str) -> Option<&'a Value> {
    input.get(name).filter(|v| !v.is_null())
}

/// Mouse, keyboard and screenshot control of one page.
pub struct ComputerTool {
    driver: Arc<dyn BrowserDriver>,
    viewport: Viewport,
    cursor: (u32, u32),
    use_cursor: bool,
    screenshot_wait_until: Option<WaitUntil>,
}

impl ComputerTool {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        viewport: Viewport,
        use_cursor: bool,
        screenshot_wait_until: Option<WaitUntil>,
    ) -> Self {
        Self {
            driver,
            viewport,
            cursor: (0, 0),
            use_cursor,
            screenshot_wait_until,
        }
    }

    /// Last position the pointer was moved to.
    pub fn cursor(&self) -> (u32, u32) {
        self.cursor
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Run one action described by `input` (`{"action": ..., "coordinate": ..., "text": ...}`).
    pub async fn call(&mut self, input: &Value) -> ToolResult {
        let action = match input.get("action") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        debug!(target: "agent.tools", %action, "computer action");

        match self.run(&action, input).await {
            Ok(result) => result,
            Err(Failure::Invalid(e)) => {
                debug!(target: "agent.tools", %action, error = %e, "rejected action");
                ToolResult::error(format!("{e} {RETRY_HINT}"))
            }
            Err(Failure::Driver(e)) => {
                warn!(target: "agent.tools", %action, error = %e, "action failed");
                ToolResult::error(format!(
                    "Unexpected error during '{action}' action: {e}. Please try again."
                ))
            }
        }
    }

    async fn run(&mut self, action: &str, input: &Value) -> Result<ToolResult, Failure> {
        let command = self.validate(action, input)?;
        self.execute(command).await
    }

    fn validate(&self, name: &str, input: &Value) -> Result<Command, ToolError> {
        let action = ComputerAction::parse(name).ok_or_else(|| {
            ToolError::new(format!(
                "Invalid action: '{name}'. Valid actions are: {}",
                valid_actions()
            ))
        })?;
        let text = param(input, "text");
        let coordinate = param(input, "coordinate");

        if action.takes_coordinate() {
            let (x, y) = match coordinate {
                Some(c) => self.parse_coordinate(c)?,
                None if matches!(
                    action,
                    ComputerAction::MouseMove | ComputerAction::LeftClickDrag
                ) =>
                {
                    return Err(ToolError::new(format!(
                        "Coordinate is required for '{name}'. Please provide x,y coordinates."
                    )))
                }
                None => self.cursor,
            };
            if text.is_some() {
                return Err(ToolError::new(format!(
                    "Text parameter is not accepted for '{name}' action."
                )));
            }
            return Ok(match action {
                ComputerAction::MouseMove => Command::Move { x, y },
                ComputerAction::LeftClickDrag => Command::Drag,
                _ => {
                    let (button, count) = action.click().unwrap_or((MouseButton::Left, 1));
                    Command::Click { x, y, button, count }
                }
            });
        }

        match action {
            ComputerAction::Key | ComputerAction::Type => {
                let text = text.ok_or_else(|| {
                    ToolError::new(format!(
                        "Text parameter is required for '{name}' action. Please provide the text to type or key to press."
                    ))
                })?;
                if coordinate.is_some() {
                    return Err(ToolError::new(format!(
                        "Coordinate parameter is not accepted for '{name}' action."
                    )));
                }
                let text = text.as_str().ok_or_else(|| {
                    ToolError::new(format!("Text must be a string, got {}.", json_type(text)))
                })?;
                if action == ComputerAction::Key {
                    Ok(Command::Key {
                        chord: KeyChord::parse(text)?,
                        text: text.to_string(),
                    })
                } else {
                    Ok(Command::Type(text.to_string()))
                }
            }
            _ => {
                if text.is_some() {
                    return Err(ToolError::new(format!(
                        "Text parameter is not accepted for '{name}' action."
                    )));
                }
                if action == ComputerAction::CursorPosition && coordinate.is_some() {
                    return Err(ToolError::new(format!(
                        "Coordinate parameter is not accepted for '{name}' action."
                    )));
                }
                Ok(if action == ComputerAction::Screenshot {
                    Command::Screenshot
                } else {
                    Command::CursorPosition
                })
            }
        }
    }

    fn parse_coordinate(&self, value: &Value) -> Result<(u32, u32), ToolError> {
        let items = value.as_array().ok_or_else(|| {
            ToolError::new(format!(
                "Coordinate must be a list or tuple of [x,y], got {}.",
                json_type(value)
            ))
        })?;
        if items.len() != 2 {
            return Err(ToolError::new(format!(
                "Coordinate must have exactly 2 elements (x,y), got {}.",
                items.len()
            )));
        }
        let nums: Vec<f64> = items
            .iter()
            .filter_map(Value::as_f64)
            .filter(|n| *n >= 0.0)
            .collect();
        if nums.len() != 2 {
            return Err(ToolError::new(format!(
                "Coordinate elements must be non-negative numbers. Got: {value}"
            )));
        }
        // `as` truncates toward zero and saturates, so huge values fail the bounds check.
        let (x, y) = (nums[0] as u32, nums[1] as u32);
        if !self.viewport.contains(x, y) {
            return Err(ToolError::new(format!(
                "Coordinate ({x},{y}) is outside viewport bounds ({}x{}). Please use coordinates within the visible area.",
                self.viewport.width, self.viewport.height
            )));
        }
        Ok((x, y))
    }

    async fn execute(&mut self, command: Command) -> Result<ToolResult, Failure> {
        match command {
            Command::Move { x, y } => {
                self.driver.mouse_move(x, y).await?;
                self.cursor = (x, y);
                Ok(ToolResult::output(format!("Moved cursor to ({x},{y})")))
            }
            Command::Click { x, y, button, count } => {
                self.driver.mouse_move(x, y).await?;
                self.cursor = (x, y);
                self.driver.mouse_click(x, y, button, count).await?;
                Ok(self.screenshot().await)
            }
            Command::Drag => Err(ToolError::new(
                "The left_click_drag action is not implemented yet. Please use mouse_move followed by left_click instead.",
            )
            .into()),
            Command::Key { chord, text } => {
                self.press_chord(&chord).await?;
                Ok(ToolResult::output(format!("Pressed key: {text}")))
            }
            Command::Type(text) => {
                for chunk in chunks(&text, TYPING_GROUP_SIZE) {
                    self.driver.keyboard_type(&chunk).await?;
                }
                Ok(self.screenshot().await)
            }
            Command::Screenshot => Ok(self.screenshot().await),
            Command::CursorPosition => {
                let (x, y) = self.cursor;
                Ok(ToolResult::output(format!("Cursor position: X={x}, Y={y}")))
            }
        }
    }

    /// Press modifiers in order, then the key, then release modifiers in
    /// reverse. Modifiers already down are released even when a step fails.
    async fn press_chord(&self, chord: &KeyChord) -> Result<(), ToolError> {
        let mut pressed: Vec<&str> = Vec::with_capacity(chord.modifiers.len());
        let mut outcome = Ok(());
        for &modifier in &chord.modifiers {
            if let Err(e) = self.driver.keyboard_down(modifier).await {
                outcome = Err(e);
                break;
            }
            pressed.push(modifier);
        }
        if outcome.is_ok() {
            outcome = self.driver.keyboard_press(&chord.key).await;
        }

        for modifier in pressed.iter().rev() {
            if let Err(release) = self.driver.keyboard_up(modifier).await {
                warn!(target: "agent.tools", %modifier, error = %release, "failed to release modifier");
                if outcome.is_ok() {
                    outcome = Err(release);
                }
            }
        }
        outcome.map_err(|e| ToolError::new(format!("Error pressing key '{}': {e}", chord.raw_key)))
    }

    /// Capture the page as a base64 PNG. Failures become an error result.
    pub async fn screenshot(&self) -> ToolResult {
        match self.capture().await {
            Ok(b64) => ToolResult::image(b64),
            Err(e) => {
                warn!(target: "agent.tools", error = %e, "screenshot failed");
                ToolResult::error(format!("Failed to take screenshot: {e}"))
            }
        }
    }

    async fn capture(&self) -> anyhow::Result<String> {
        if let Some(condition) = self.screenshot_wait_until {
            self.driver.wait_for_ready(Some(condition)).await?;
        }
        self.driver.wait_for_ready(None).await?;
        let png = self.driver.screenshot().await?;
        let cursor = self.use_cursor.then_some(self.cursor);
        render_frame(&png, self.viewport, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_list_is_alphabetical() {
        assert_eq!(
            valid_actions(),
            "cursor_position, double_click, key, left_click, left_click_drag, middle_click, mouse_move, right_click, screenshot, type"
        );
    }

    #[test]
    fn typing_chunks_reassemble() {
        let text: String = "abcdefghij".repeat(12);
        let parts = chunks(&text, TYPING_GROUP_SIZE);
        assert_eq!(
            parts.iter().map(|p| p.chars().count()).collect::<Vec<_>>(),
            vec![50, 50, 20]
        );
        assert_eq!(parts.concat(), text);
        assert!(chunks("", TYPING_GROUP_SIZE).is_empty());
    }

    #[test]
    fn chunks_respect_multibyte_characters() {
        let text = "é".repeat(51);
        let parts = chunks(&text, TYPING_GROUP_SIZE);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "é");
    }
}
