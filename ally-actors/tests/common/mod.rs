#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use ally_common::observability::{LogConfig, LogFormat};
use ally_llm::context::count_tool_result_images;
use ally_llm::traits::{ModelClient, ModelError, ModelRequest};
use ally_llm::types::{ContentBlock, Role};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "ally-actors-tests",
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug".to_string(),
            ..LogConfig::default()
        };
        ally_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// What the model saw on one request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub messages: usize,
    pub images: usize,
    pub last_role: Option<Role>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Vec<ContentBlock>, ModelError>>,
    seen: Vec<SeenRequest>,
}

/// Model that answers from a queue. Once the queue is empty it says "done".
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request waits for a permit from [`ScriptedModel::release`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn release(&self, requests: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(requests);
        }
    }

    pub fn reply(&self, blocks: Vec<ContentBlock>) -> &Self {
        self.script.lock().unwrap().replies.push_back(Ok(blocks));
        self
    }

    pub fn fail(&self, error: ModelError) -> &Self {
        self.script.lock().unwrap().replies.push_back(Err(error));
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.script.lock().unwrap().seen.clone()
    }

    pub fn requests(&self) -> usize {
        self.script.lock().unwrap().seen.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<Vec<ContentBlock>, ModelError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ModelError::Network(e.to_string()))?
                .forget();
        }
        let mut script = self.script.lock().unwrap();
        script.seen.push(SeenRequest {
            messages: request.history.len(),
            images: count_tool_result_images(request.history),
            last_role: request.history.last().map(|m| m.role),
        });
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Ok(vec![ContentBlock::text("done")]))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn tool_use(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

pub fn screenshot_call(id: &str) -> Vec<ContentBlock> {
    vec![
        ContentBlock::text("Let me look at the page."),
        tool_use(id, "computer", json!({"action": "screenshot"})),
    ]
}
