//! The agent loop: ask the model, run the tools it calls, feed results back.
use ally_llm::context::{filter_to_n_most_recent_images, inject_prompt_caching};
use ally_llm::prompt::system_prompt_for_today;
use ally_llm::traits::{ModelClient, ModelError, ModelRequest};
use ally_llm::types::{ContentBlock, Message, Role, ToolResult};
use ally_tools::Toolbox;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result text for a tool call skipped because the run was cancelled.
pub const CANCELLED_CALL: &str = "Tool call cancelled before it ran.";

#[derive(Debug, Clone)]
pub struct SamplingOptions {
    pub system_prompt: String,
    /// Screenshots kept in history; `None` or 0 keeps all of them.
    pub only_n_most_recent_images: Option<usize>,
    /// Prune in batches of this many images. Defaults to the retention count.
    pub min_removal_chunk: Option<usize>,
    /// Upper bound on model requests per run.
    pub max_turns: Option<usize>,
    pub prompt_caching: bool,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            system_prompt: system_prompt_for_today(),
            only_n_most_recent_images: Some(5),
            min_removal_chunk: None,
            max_turns: None,
            prompt_caching: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// The model answered without calling a tool.
    Completed,
    /// `max_turns` model requests were made.
    Truncated,
    /// The model could not be reached.
    Interrupted,
    /// Cancelled between steps. Tool calls skipped by the cancellation are
    /// answered with an error result, so every call in the history has one.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Conversation with the system prompt as the first turn.
    pub history: Vec<Message>,
    pub status: LoopStatus,
}

impl LoopOutcome {
    /// Text of the last assistant turn, if the history ends with one.
    pub fn final_text(&self) -> Option<String> {
        self.history
            .last()
            .filter(|m| m.role == Role::Assistant)
            .map(Message::text)
    }
}

fn finish(options: &SamplingOptions, messages: Vec<Message>, status: LoopStatus) -> LoopOutcome {
    let mut history = Vec::with_capacity(messages.len() + 1);
    history.push(Message::system(options.system_prompt.clone()));
    history.extend(messages);
    LoopOutcome { history, status }
}

/// Run the loop until the model stops calling tools.
///
/// Network failures end the run with [`LoopStatus::Interrupted`]; every other
/// [`ModelError`] is returned. `cancel` is checked before each model request
/// and each tool call.
pub async fn sampling_loop(
    model: &dyn ModelClient,
    toolbox: &mut Toolbox,
    mut messages: Vec<Message>,
    options: &SamplingOptions,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, ModelError> {
    let tools = toolbox.specs();
    let mut turns = 0usize;

    loop {
        if cancel.is_cancelled() {
            info!(target: "agent.loop", turns, "run cancelled");
            return Ok(finish(options, messages, LoopStatus::Cancelled));
        }
        if options.max_turns.is_some_and(|max| turns >= max) {
            info!(target: "agent.loop", turns, "turn limit reached");
            return Ok(finish(options, messages, LoopStatus::Truncated));
        }

        if options.prompt_caching {
            inject_prompt_caching(&mut messages);
        } else if let Some(keep) = options.only_n_most_recent_images {
            let chunk = options.min_removal_chunk.unwrap_or(keep);
            let removed = filter_to_n_most_recent_images(&mut messages, Some(keep), chunk);
            if removed > 0 {
                debug!(target: "agent.context", removed, keep, chunk, "pruned screenshots");
            }
        }

        let request = ModelRequest {
            system_prompt: &options.system_prompt,
            history: &messages,
            tools: &tools,
            prompt_caching: options.prompt_caching,
        };
        debug!(target: "agent.loop", turn = turns + 1, messages = messages.len(), model = model.model_name(), "requesting model turn");
        let blocks = match model.complete(request).await {
            Ok(blocks) => blocks,
            Err(e) if !e.is_hard() => {
                warn!(target: "agent.loop", error = %e, "model unreachable; ending run");
                return Ok(finish(options, messages, LoopStatus::Interrupted));
            }
            Err(e) => {
                error!(target: "agent.loop", error = %e, "model request failed");
                return Err(e);
            }
        };
        turns += 1;

        let assistant = Message::assistant(blocks);
        let calls: Vec<(String, String, Value)> = assistant
            .tool_uses()
            .map(|u| (u.id.to_string(), u.name.to_string(), u.input.clone()))
            .collect();
        messages.push(assistant);

        if calls.is_empty() {
            info!(target: "agent.loop", turns, "model finished");
            return Ok(finish(options, messages, LoopStatus::Completed));
        }

        let mut results = Vec::with_capacity(calls.len());
        for (id, name, input) in &calls {
            if cancel.is_cancelled() {
                break;
            }
            debug!(target: "agent.loop", tool = %name, tool_use_id = %id, input = %input, "dispatching tool call");
            results.push(toolbox.run_tool(name, input, id).await);
        }
        let finished = results.len();
        for (id, _, _) in &calls[finished..] {
            results.push(ContentBlock::tool_result(id.as_str(), ToolResult::error(CANCELLED_CALL)));
        }
        messages.push(Message::tool_results(results));
        if finished < calls.len() {
            info!(target: "agent.loop", turns, skipped = calls.len() - finished, "run cancelled during tool calls");
            return Ok(finish(options, messages, LoopStatus::Cancelled));
        }
    }
}
