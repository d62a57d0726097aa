//! Anthropic Messages API adapter.
//!
//! Translates the unified request into Anthropic's content-block wire
//! format: system prompt as a dedicated top-level field, tool calls as
//! `tool_use` blocks, streaming as typed SSE events.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{
    create_sse_stream, ChatMessage, ChatProvider, ChatRequest, ChatStream, CompletionResponse,
    StopReason, StreamChunk, Tool, ToolCall, ToolCallDelta,
};
use crate::config::EnvConfig;
use crate::error::LLMError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_VERSION: &str = "2023-06-01";

/// Environment variables checked for a credential, in priority order.
const API_KEY_VARS: &[&str] = &["ANTHROPIC_API_KEY"];

/// Configuration for the Anthropic client.
#[derive(Debug, Clone)]
struct AnthropicConfig {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    timeout_seconds: Option<u64>,
}

/// Client for Anthropic's Messages API.
///
/// Configuration is wrapped in `Arc`, making cloning cheap; it is
/// immutable after construction.
#[derive(Debug, Clone)]
pub struct Anthropic {
    config: Arc<AnthropicConfig>,
    client: Client,
}

impl Anthropic {
    /// Creates a client, resolving the credential from `env`.
    pub fn new(env: &EnvConfig, model: Option<String>, timeout_seconds: Option<u64>) -> Self {
        Self::with_client(Client::new(), env, model, timeout_seconds)
    }

    /// Creates a client with a custom HTTP client.
    pub fn with_client(
        client: Client,
        env: &EnvConfig,
        model: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> Self {
        let api_key = env
            .first_of(API_KEY_VARS)
            .map(|key| SecretString::new(key.to_string()));
        Self {
            config: Arc::new(AnthropicConfig {
                api_key,
                model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_seconds,
            }),
            client,
        }
    }

    /// Overrides the API base URL (local proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn require_key(&self) -> Result<&SecretString, LLMError> {
        self.config
            .api_key
            .as_ref()
            .ok_or_else(|| LLMError::AuthError("Missing Anthropic API key".to_string()))
    }

    async fn post_messages(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let api_key = self.require_key()?;
        let body = build_body(&self.config.model, request, stream);

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("Anthropic request payload: {}", json);
            }
        }

        let mut req = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", api_key.expose_secret().as_str())
            .header("anthropic-version", API_VERSION)
            .json(&body);

        if let Some(timeout) = self.config.timeout_seconds {
            req = req.timeout(std::time::Duration::from_secs(timeout));
        }

        let resp = req.send().await?;

        log::debug!("Anthropic HTTP status: {}", resp.status());

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LLMError::HttpError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for Anthropic {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LLMError> {
        let resp = self.post_messages(request, false).await?;
        let raw = resp.text().await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|err| LLMError::ResponseFormatError {
                message: err.to_string(),
                raw_response: raw,
            })?;
        Ok(parse_response(parsed))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, LLMError> {
        let resp = self.post_messages(request, true).await?;
        Ok(create_sse_stream(resp, parse_stream_payload))
    }
}

fn build_body<'a>(model: &'a str, request: &'a ChatRequest, stream: bool) -> MessagesBody<'a> {
    MessagesBody {
        model,
        max_tokens: request.max_tokens,
        messages: request.messages.iter().map(convert_message).collect(),
        system: request.system.as_deref(),
        temperature: request.temperature,
        tools: request
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(convert_tool).collect()),
        stream,
    }
}

fn convert_message(message: &ChatMessage) -> WireMessage<'_> {
    use crate::chat::ChatRole;
    WireMessage {
        // Anthropic has no system role in `messages`; a stray System
        // entry is carried as user content rather than rejected.
        role: match message.role {
            ChatRole::Assistant => "assistant",
            ChatRole::User | ChatRole::System => "user",
        },
        content: &message.content,
    }
}

fn convert_tool(tool: &Tool) -> WireTool<'_> {
    WireTool {
        name: &tool.function.name,
        description: &tool.function.description,
        input_schema: &tool.function.parameters,
    }
}

fn parse_response(resp: MessagesResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            ContentBlock::Unknown => {}
        }
    }

    CompletionResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        usage: resp.usage.map(|u| crate::chat::Usage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        }),
        stop_reason: map_stop_reason(resp.stop_reason.as_deref()),
    }
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        _ => StopReason::End,
    }
}

/// Translates one SSE `data:` payload into normalized chunks.
///
/// Unparsable payloads yield nothing; partial frames are expected on
/// this transport.
fn parse_stream_payload(payload: &str) -> Vec<StreamChunk> {
    let event: StreamEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(err) => {
            log::trace!("Discarding unparsable Anthropic frame: {}", err);
            return Vec::new();
        }
    };

    match event {
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            ContentBlock::ToolUse { id, name, .. } => {
                vec![StreamChunk::ToolCall(ToolCallDelta {
                    index,
                    id: Some(id),
                    name: Some(name),
                    arguments: String::new(),
                })]
            }
            _ => Vec::new(),
        },
        StreamEvent::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => vec![StreamChunk::Text(text)],
            BlockDelta::InputJsonDelta { partial_json } => {
                vec![StreamChunk::ToolCall(ToolCallDelta {
                    index,
                    id: None,
                    name: None,
                    arguments: partial_json,
                })]
            }
            BlockDelta::Unknown => Vec::new(),
        },
        StreamEvent::MessageStop => vec![StreamChunk::Done],
        StreamEvent::Other => Vec::new(),
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}
