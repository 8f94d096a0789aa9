//! Flat, role-tagged trace export of a finished conversation.
//!
//! Each assistant text and each tool call becomes its own record, and tool
//! calls are rendered in the common `function` call shape so traces can be
//! loaded by tooling that knows nothing about the Messages API.
use crate::types::{ContentBlock, Message, Role, ToolResultContent};
use serde_json::{json, Value};

/// Prefix marking an inline base64 screenshot in a tool record.
pub const IMAGE_PREFIX: &str = "local_base64_img: ";

/// Flatten `messages` into trace records.
///
/// Tool results without image or text are dropped unless
/// `keep_empty_tool_response` is set, in which case they become
/// `{"is_error": true}` or `{}`.
pub fn to_flat_trace(messages: &[Message], keep_empty_tool_response: bool) -> Vec<Value> {
    let mut out = Vec::new();
    for message in messages {
        match message.role {
            Role::System => out.push(json!({"role": "system", "content": message.text()})),
            Role::User => {
                for block in &message.content {
                    match block {
                        ContentBlock::Text { text, .. } => {
                            out.push(json!({"role": "user", "content": text}));
                        }
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                            ..
                        } => {
                            if let Some(record) =
                                tool_record(tool_use_id, content, *is_error, keep_empty_tool_response)
                            {
                                out.push(record);
                            }
                        }
                        _ => {}
                    }
                }
            }
            Role::Assistant => {
                for block in &message.content {
                    match block {
                        ContentBlock::Text { text, .. } => {
                            out.push(json!({"role": "assistant", "content": text}));
                        }
                        ContentBlock::ToolUse { id, name, input } => out.push(json!({
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "tool_id": id,
                                "type": "function",
                                "function": {"name": name, "arguments": input},
                            }],
                        })),
                        _ => {}
                    }
                }
            }
        }
    }
    out
}

fn tool_record(
    tool_use_id: &str,
    content: &[ToolResultContent],
    is_error: bool,
    keep_empty: bool,
) -> Option<Value> {
    let image = content.iter().find_map(|item| match item {
        ToolResultContent::Image { source } => Some(source.data()),
        _ => None,
    });
    if let Some(data) = image {
        return Some(json!({
            "role": "tool",
            "content": format!("{IMAGE_PREFIX}{data}"),
            "tool_id": tool_use_id,
        }));
    }

    let text: Vec<&str> = content
        .iter()
        .filter_map(|item| match item {
            ToolResultContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if !text.is_empty() {
        return Some(json!({
            "role": "tool",
            "content": text.join("\n"),
            "tool_id": tool_use_id,
            "is_error": is_error,
        }));
    }

    keep_empty.then(|| {
        json!({
            "role": "tool",
            "content": if is_error { json!({"is_error": true}) } else { json!({}) },
            "tool_id": tool_use_id,
        })
    })
}
