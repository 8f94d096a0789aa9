//! Conversation data model shared by the loop, the tools and model providers.
//!
//! The serialized shape of [`Message`] and [`ContentBlock`] is the Messages API
//! wire format, so providers can send history without a translation layer.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Tool calls in this turn, in arrival order.
    pub fn tool_uses(&self) -> impl Iterator<Item = ToolUse<'_>> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ToolUse { id, name, input }),
            _ => None,
        })
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Borrowed view of a `tool_use` block.
#[derive(Debug, Clone, Copy)]
pub struct ToolUse<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub input: &'a Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheControl {
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
}

impl ImageSource {
    pub fn png(data: impl Into<String>) -> Self {
        ImageSource::Base64 {
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    pub fn data(&self) -> &str {
        match self {
            ImageSource::Base64 { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Vec<ToolResultContent>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Wrap a [`ToolResult`] into the envelope the model correlates by `tool_use_id`.
    ///
    /// ```
    /// use ally_llm::types::{ContentBlock, ToolResult, ToolResultContent};
    ///
    /// let block = ContentBlock::tool_result("toolu_1", ToolResult::error("boom"));
    /// match block {
    ///     ContentBlock::ToolResult { tool_use_id, content, is_error, .. } => {
    ///         assert_eq!(tool_use_id, "toolu_1");
    ///         assert!(is_error);
    ///         assert_eq!(content, vec![ToolResultContent::Text { text: "boom".into() }]);
    ///     }
    ///     _ => unreachable!(),
    /// }
    /// ```
    pub fn tool_result(tool_use_id: impl Into<String>, result: ToolResult) -> Self {
        let tool_use_id = tool_use_id.into();
        if let Some(error) = result.error {
            return ContentBlock::ToolResult {
                tool_use_id,
                content: vec![ToolResultContent::Text { text: error }],
                is_error: true,
                cache_control: None,
            };
        }

        let mut content = Vec::new();
        if let Some(text) = result.output {
            content.push(ToolResultContent::Text { text });
        }
        if let Some(data) = result.base64_image {
            content.push(ToolResultContent::Image {
                source: ImageSource::png(data),
            });
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error: false,
            cache_control: None,
        }
    }

    /// Mutable access to the cache breakpoint, for block kinds that accept one.
    pub fn cache_control_mut(&mut self) -> Option<&mut Option<CacheControl>> {
        match self {
            ContentBlock::Text { cache_control, .. }
            | ContentBlock::ToolResult { cache_control, .. } => Some(cache_control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolResultContent {
    Text { text: String },
    Image { source: ImageSource },
}

/// Outcome of one tool invocation.
///
/// Built only through the constructors so an error never carries an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub base64_image: Option<String>,
}

impl ToolResult {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(base64_png: impl Into<String>) -> Self {
        Self {
            base64_image: Some(base64_png.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Description of one tool as surfaced to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub kind: ToolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Plain function tool described by its JSON schema.
    Function,
    /// Provider-defined screen control tool.
    Computer {
        display_width_px: u32,
        display_height_px: u32,
        display_number: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blocks_use_wire_names() {
        let msg = Message::assistant(vec![
            ContentBlock::text("checking"),
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "computer".into(),
                input: json!({"action": "screenshot"}),
            },
        ]);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            json!({
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "checking"},
                    {"type": "tool_use", "id": "toolu_1", "name": "computer", "input": {"action": "screenshot"}}
                ]
            })
        );
    }

    #[test]
    fn success_envelope_lists_text_then_image() {
        let result = ToolResult {
            output: Some("done".into()),
            error: None,
            base64_image: Some("iVBOR".into()),
        };
        let v = serde_json::to_value(ContentBlock::tool_result("toolu_9", result)).unwrap();
        assert_eq!(
            v,
            json!({
                "type": "tool_result",
                "tool_use_id": "toolu_9",
                "content": [
                    {"type": "text", "text": "done"},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBOR"}}
                ]
            })
        );
    }

    #[test]
    fn tool_uses_preserve_order() {
        let msg = Message::assistant(vec![
            ContentBlock::ToolUse {
                id: "a".into(),
                name: "set_url".into(),
                input: json!({"url": "https://example.org"}),
            },
            ContentBlock::text("between"),
            ContentBlock::ToolUse {
                id: "b".into(),
                name: "computer".into(),
                input: json!({"action": "screenshot"}),
            },
        ]);
        let ids: Vec<_> = msg.tool_uses().map(|t| t.id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(msg.text(), "between");
    }
}
