//! OpenAI chat-completions API adapter.
//!
//! System prompt travels as a leading `system` message, tool-call
//! arguments arrive as JSON *strings* (parsed leniently, since they are
//! not required to be valid mid-stream), and the streaming terminal is
//! the literal `data: [DONE]` frame.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{
    create_sse_stream, ChatMessage, ChatProvider, ChatRequest, ChatStream, CompletionResponse,
    StopReason, StreamChunk, Tool, ToolCall, ToolCallDelta, Usage,
};
use crate::config::EnvConfig;
use crate::error::LLMError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Environment variables checked for a credential, in priority order.
const API_KEY_VARS: &[&str] = &["OPENAI_API_KEY"];

#[derive(Debug, Clone)]
struct OpenAIConfig {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    timeout_seconds: Option<u64>,
}

/// Client for OpenAI's chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAI {
    config: Arc<OpenAIConfig>,
    client: Client,
}

impl OpenAI {
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
            config: Arc::new(OpenAIConfig {
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
            .ok_or_else(|| LLMError::AuthError("Missing OpenAI API key".to_string()))
    }

    async fn post_completions(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let api_key = self.require_key()?;
        let body = build_body(&self.config.model, request, stream);

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("OpenAI request payload: {}", json);
            }
        }

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        if let Some(timeout) = self.config.timeout_seconds {
            req = req.timeout(std::time::Duration::from_secs(timeout));
        }

        let resp = req.send().await?;

        log::debug!("OpenAI HTTP status: {}", resp.status());

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
impl ChatProvider for OpenAI {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LLMError> {
        let resp = self.post_completions(request, false).await?;
        let raw = resp.text().await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&raw).map_err(|err| LLMError::ResponseFormatError {
                message: err.to_string(),
                raw_response: raw,
            })?;
        Ok(parse_response(parsed))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, LLMError> {
        let resp = self.post_completions(request, true).await?;
        Ok(create_sse_stream(resp, parse_stream_payload))
    }
}

fn build_body<'a>(model: &'a str, request: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
    let mut messages: Vec<WireMessage> = Vec::with_capacity(request.messages.len() + 1);

    // System prompt becomes a leading system message, per OpenAI
    // convention.
    if let Some(system) = request.system.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(request.messages.iter().map(convert_message));

    ChatBody {
        model,
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        tools: request.tools.as_deref(),
        stream,
    }
}

fn convert_message(message: &ChatMessage) -> WireMessage<'_> {
    use crate::chat::ChatRole;
    WireMessage {
        role: match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        },
        content: &message.content,
    }
}

fn parse_response(resp: ChatCompletionResponse) -> CompletionResponse {
    let choice = resp.choices.into_iter().next();

    let (content, tool_calls, finish_reason) = match choice {
        Some(choice) => {
            let calls: Vec<ToolCall> = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(i, call)| ToolCall {
                    id: call.id.unwrap_or_else(|| format!("call_{i}")),
                    name: call.function.name.unwrap_or_default(),
                    arguments: parse_arguments(call.function.arguments.as_deref()),
                })
                .collect();
            (
                choice.message.content.unwrap_or_default(),
                calls,
                choice.finish_reason,
            )
        }
        None => (String::new(), Vec::new(), None),
    };

    CompletionResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        usage: resp.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
        stop_reason: map_finish_reason(finish_reason.as_deref()),
    }
}

/// OpenAI ships tool arguments as a JSON string; keep the raw text when
/// it does not parse rather than failing the whole response.
fn parse_arguments(raw: Option<&str>) -> Value {
    match raw {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        None => Value::Null,
    }
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls") => StopReason::ToolUse,
        _ => StopReason::End,
    }
}

/// Translates one SSE `data:` payload into normalized chunks.
fn parse_stream_payload(payload: &str) -> Vec<StreamChunk> {
    if payload.trim() == "[DONE]" {
        return vec![StreamChunk::Done];
    }

    let frame: StreamFrame = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(err) => {
            log::trace!("Discarding unparsable OpenAI frame: {}", err);
            return Vec::new();
        }
    };

    let mut chunks = Vec::new();
    for choice in frame.choices {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                chunks.push(StreamChunk::Text(text));
            }
        }
        for call in choice.delta.tool_calls.unwrap_or_default() {
            chunks.push(StreamChunk::ToolCall(ToolCallDelta {
                index: call.index,
                id: call.id,
                name: call.function.as_ref().and_then(|f| f.name.clone()),
                arguments: call
                    .function
                    .and_then(|f| f.arguments)
                    .unwrap_or_default(),
            }));
        }
    }
    chunks
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<DeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}
