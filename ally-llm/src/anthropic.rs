use crate::traits::{ModelClient, ModelError, ModelRequest};
use crate::types::{ContentBlock, Role, ToolKind, ToolSpec};
use ally_http::{Auth, HttpClient, HttpError, RequestOpts};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const COMPUTER_USE_BETA: &str = "computer-use-2025-01-24";
pub const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
/// Tool type paired with [`COMPUTER_USE_BETA`].
pub const COMPUTER_TOOL_TYPE: &str = "computer_20250124";

/// Messages API client.
pub struct AnthropicClient {
    client: HttpClient,
    auth: Auth<'static>,
    model: String,
    max_tokens: u32,
    computer_use_beta: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicClient {
    /// Create a client for `endpoint` (normally [`ANTHROPIC_API_BASE`]).
    ///
    /// Model turns with screenshots are slow, so the request timeout is
    /// generous compared to the HTTP client default.
    pub fn new(endpoint: &str, api_key: &str, model: impl Into<String>) -> Result<Self, ModelError> {
        let client = HttpClient::new(endpoint)
            .map_err(|e| ModelError::Config(format!("HttpClient init failed: {e}")))?
            .with_timeout(Duration::from_secs(180));
        let auth = Auth::header("x-api-key", api_key)
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Self {
            client,
            auth,
            model: model.into(),
            max_tokens: 4096,
            computer_use_beta: COMPUTER_USE_BETA.to_string(),
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_computer_use_beta(mut self, beta: impl Into<String>) -> Self {
        self.computer_use_beta = beta.into();
        self
    }

    fn headers(&self, prompt_caching: bool) -> Result<HeaderMap, ModelError> {
        let mut betas = vec![self.computer_use_beta.as_str()];
        if prompt_caching {
            betas.push(PROMPT_CACHING_BETA);
        }
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(
            "anthropic-beta",
            HeaderValue::from_str(&betas.join(","))
                .map_err(|e| ModelError::Config(format!("invalid beta flag: {e}")))?,
        );
        Ok(headers)
    }

    /// Request body for one turn. System turns in the history are not sent.
    pub fn request_body(&self, request: &ModelRequest<'_>) -> Value {
        let mut system = json!({"type": "text", "text": request.system_prompt});
        if request.prompt_caching {
            system["cache_control"] = json!({"type": "ephemeral"});
        }
        let messages: Vec<&crate::types::Message> = request
            .history
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": [system],
            "messages": messages,
            "tools": request.tools.iter().map(tool_param).collect::<Vec<_>>(),
        })
    }
}

fn tool_param(spec: &ToolSpec) -> Value {
    match spec.kind {
        ToolKind::Computer {
            display_width_px,
            display_height_px,
            display_number,
        } => json!({
            "type": COMPUTER_TOOL_TYPE,
            "name": spec.name,
            "display_width_px": display_width_px,
            "display_height_px": display_height_px,
            "display_number": display_number,
        }),
        ToolKind::Function => json!({
            "name": spec.name,
            "description": spec.description,
            "input_schema": spec.input_schema,
        }),
    }
}

fn into_content_blocks(blocks: Vec<ResponseBlock>) -> Result<Vec<ContentBlock>, ModelError> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block.kind.as_str() {
            "text" => {
                let text = block
                    .text
                    .ok_or_else(|| ModelError::Protocol("text block without text".into()))?;
                out.push(ContentBlock::text(text));
            }
            "tool_use" => {
                let (Some(id), Some(name)) = (block.id, block.name) else {
                    return Err(ModelError::Protocol("tool_use block without id or name".into()));
                };
                out.push(ContentBlock::ToolUse {
                    id,
                    name,
                    input: block.input.unwrap_or_else(|| json!({})),
                });
            }
            other => {
                tracing::debug!(target: "agent.model", kind = %other, "skipping unsupported response block");
            }
        }
    }
    Ok(out)
}

fn http_to_model(e: HttpError) -> ModelError {
    match e {
        HttpError::Network(msg) => ModelError::Network(msg),
        HttpError::Api {
            status, message, ..
        } => ModelError::Api {
            status: status.as_u16(),
            message,
        },
        HttpError::Decode(err, snippet) => ModelError::Protocol(format!("{err} (body: {snippet})")),
        HttpError::Url(msg) | HttpError::Build(msg) => ModelError::Config(msg),
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<Vec<ContentBlock>, ModelError> {
        let body = self.request_body(&request);
        let opts = RequestOpts {
            auth: Some(self.auth.clone()),
            headers: Some(self.headers(request.prompt_caching)?),
            ..Default::default()
        };

        let resp: MessagesResponse = self
            .client
            .post_json("messages", &body, opts)
            .await
            .map_err(http_to_model)?;

        tracing::debug!(
            target: "agent.model",
            model = %self.model,
            stop_reason = ?resp.stop_reason,
            input_tokens = resp.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = resp.usage.as_ref().map(|u| u.output_tokens),
            blocks = resp.content.len(),
            "model turn complete"
        );

        into_content_blocks(resp.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
