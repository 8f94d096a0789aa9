//! Context window management: screenshot pruning and prompt-cache breakpoints.
use crate::types::{CacheControl, ContentBlock, Message, Role, ToolResultContent};

/// Cache breakpoints placed on the most recent user turns.
const CACHE_BREAKPOINTS: usize = 3;

/// Number of images embedded in tool results across `messages`.
pub fn count_tool_result_images(messages: &[Message]) -> usize {
    tool_result_contents(messages)
        .flat_map(|content| content.iter())
        .filter(|item| matches!(item, ToolResultContent::Image { .. }))
        .count()
}

/// Drop the oldest tool-result images so at most `images_to_keep` remain,
/// removing in multiples of `min_removal_chunk`.
///
/// Text next to a dropped image is kept. `None` and `Some(0)` both disable
/// pruning, and a chunk of 0 counts as 1. Returns how many images were removed.
///
/// ```
/// use ally_llm::context::{count_tool_result_images, filter_to_n_most_recent_images};
/// use ally_llm::types::{ContentBlock, Message, ToolResult};
///
/// let mut history: Vec<Message> = (0..7)
///     .map(|i| Message::tool_results(vec![ContentBlock::tool_result(
///         format!("toolu_{i}"),
///         ToolResult::image("iVBOR"),
///     )]))
///     .collect();
///
/// // 7 images, keep 3, chunk 2: excess 4 is already a multiple of 2.
/// assert_eq!(filter_to_n_most_recent_images(&mut history, Some(3), 2), 4);
/// assert_eq!(count_tool_result_images(&history), 3);
/// ```
pub fn filter_to_n_most_recent_images(
    messages: &mut [Message],
    images_to_keep: Option<usize>,
    min_removal_chunk: usize,
) -> usize {
    let Some(keep) = images_to_keep.filter(|&keep| keep > 0) else {
        return 0;
    };
    let chunk = min_removal_chunk.max(1);

    let total = count_tool_result_images(messages);
    let excess = total.saturating_sub(keep);
    let to_remove = excess - excess % chunk;
    if to_remove == 0 {
        return 0;
    }

    let mut remaining = to_remove;
    for content in tool_result_contents_mut(messages) {
        content.retain(|item| match item {
            ToolResultContent::Image { .. } if remaining > 0 => {
                remaining -= 1;
                false
            }
            _ => true,
        });
        if remaining == 0 {
            break;
        }
    }

    tracing::debug!(
        target: "agent.context",
        total,
        keep,
        chunk,
        removed = to_remove,
        "pruned screenshots from history"
    );
    to_remove
}

/// Mark the last block of the three most recent user turns as ephemeral cache
/// breakpoints and clear the breakpoint left on the turn before them.
pub fn inject_prompt_caching(messages: &mut [Message]) {
    let mut breakpoints_remaining = CACHE_BREAKPOINTS;
    for message in messages.iter_mut().rev() {
        if message.role != Role::User {
            continue;
        }
        let Some(last) = message.content.last_mut() else {
            continue;
        };
        let Some(slot) = last.cache_control_mut() else {
            continue;
        };
        if breakpoints_remaining > 0 {
            breakpoints_remaining -= 1;
            *slot = Some(CacheControl::Ephemeral);
        } else {
            *slot = None;
            // Only one older breakpoint can exist, left over from the previous turn.
            break;
        }
    }
}

fn tool_result_contents(messages: &[Message]) -> impl Iterator<Item = &Vec<ToolResultContent>> {
    messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|block| match block {
            ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
}

fn tool_result_contents_mut(
    messages: &mut [Message],
) -> impl Iterator<Item = &mut Vec<ToolResultContent>> {
    messages
        .iter_mut()
        .flat_map(|m| m.content.iter_mut())
        .filter_map(|block| match block {
            ContentBlock::ToolResult { content, .. } => Some(content),
            _ => None,
        })
}
