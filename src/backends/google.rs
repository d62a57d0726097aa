//! Google Gemini API adapter.
//!
//! Gemini disagrees with the other backends on almost everything: the
//! envelope is `contents`/`parts` with a `model` role instead of
//! `assistant`, the system prompt is a `systemInstruction` block, the
//! credential rides in a query parameter, and streamed frames are whole
//! response objects rather than typed deltas. Function calls carry no
//! ids, so this adapter synthesizes them.

use std::sync::atomic::{AtomicUsize, Ordering};
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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Environment variables checked for a credential, in priority order.
const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

#[derive(Debug, Clone)]
struct GoogleConfig {
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    timeout_seconds: Option<u64>,
}

/// Client for Google's Gemini generateContent API.
#[derive(Debug, Clone)]
pub struct Google {
    config: Arc<GoogleConfig>,
    client: Client,
}

impl Google {
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
            config: Arc::new(GoogleConfig {
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
            .ok_or_else(|| LLMError::AuthError("Missing Gemini API key".to_string()))
    }

    async fn post_generate(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LLMError> {
        let api_key = self.require_key()?;
        let body = build_body(request);

        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&body) {
                log::trace!("Gemini request payload: {}", json);
            }
        }

        let method = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let url = format!(
            "{}/models/{}:{}",
            self.config.base_url, self.config.model, method
        );

        let mut query: Vec<(&str, &str)> = vec![("key", api_key.expose_secret().as_str())];
        if stream {
            query.push(("alt", "sse"));
        }

        let mut req = self.client.post(url).query(&query).json(&body);

        if let Some(timeout) = self.config.timeout_seconds {
            req = req.timeout(std::time::Duration::from_secs(timeout));
        }

        let resp = req.send().await?;

        log::debug!("Gemini HTTP status: {}", resp.status());

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
impl ChatProvider for Google {
    fn name(&self) -> &'static str {
        "google"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LLMError> {
        let resp = self.post_generate(request, false).await?;
        let raw = resp.text().await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|err| LLMError::ResponseFormatError {
                message: err.to_string(),
                raw_response: raw,
            })?;
        Ok(parse_response(parsed))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, LLMError> {
        let resp = self.post_generate(request, true).await?;
        let call_counter = AtomicUsize::new(0);
        Ok(create_sse_stream(resp, move |payload| {
            parse_stream_payload(payload, &call_counter)
        }))
    }
}

fn build_body(request: &ChatRequest) -> GenerateBody<'_> {
    GenerateBody {
        contents: request.messages.iter().map(convert_message).collect(),
        system_instruction: request.system.as_deref().map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        generation_config: GenerationConfig {
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        },
        tools: request.tools.as_ref().map(|tools| {
            vec![ToolBlock {
                function_declarations: tools.iter().map(convert_tool).collect(),
            }]
        }),
    }
}

fn convert_message(message: &ChatMessage) -> Content<'_> {
    use crate::chat::ChatRole;
    Content {
        // Gemini's vocabulary is user/model; a stray System entry is
        // carried as user content rather than rejected.
        role: Some(match message.role {
            ChatRole::Assistant => "model",
            ChatRole::User | ChatRole::System => "user",
        }),
        parts: vec![Part {
            text: &message.content,
        }],
    }
}

fn convert_tool(tool: &Tool) -> FunctionDeclaration<'_> {
    FunctionDeclaration {
        name: &tool.function.name,
        description: &tool.function.description,
        parameters: &tool.function.parameters,
    }
}

fn parse_response(resp: GenerateResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut stop_reason = StopReason::End;

    if let Some(candidate) = resp.candidates.into_iter().next() {
        if let Some(parts) = candidate.content.map(|c| c.parts) {
            for part in parts {
                if let Some(text) = part.text {
                    content.push_str(&text);
                }
                if let Some(call) = part.function_call {
                    // Gemini supplies no call ids; synthesize stable ones
                    // from the call's position in the response.
                    tool_calls.push(ToolCall {
                        id: format!("call_{}", tool_calls.len()),
                        name: call.name,
                        arguments: call.args,
                    });
                }
            }
        }
        stop_reason = map_finish_reason(candidate.finish_reason.as_deref());
        if !tool_calls.is_empty() {
            stop_reason = StopReason::ToolUse;
        }
    }

    CompletionResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        usage: resp.usage_metadata.map(|u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        }),
        stop_reason,
    }
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ => StopReason::End,
    }
}

/// Translates one SSE `data:` payload into normalized chunks.
///
/// Each Gemini frame is a complete `GenerateContentResponse`; a frame
/// carrying a finish reason terminates the stream. Synthesized call ids
/// number by `call_counter`, which spans the whole stream so calls in
/// separate frames stay distinct.
fn parse_stream_payload(payload: &str, call_counter: &AtomicUsize) -> Vec<StreamChunk> {
    let resp: GenerateResponse = match serde_json::from_str(payload) {
        Ok(resp) => resp,
        Err(err) => {
            log::trace!("Discarding unparsable Gemini frame: {}", err);
            return Vec::new();
        }
    };

    let mut chunks = Vec::new();
    let mut finished = false;

    for candidate in resp.candidates {
        if let Some(parts) = candidate.content.map(|c| c.parts) {
            for part in parts {
                if let Some(text) = part.text {
                    chunks.push(StreamChunk::Text(text));
                }
                if let Some(call) = part.function_call {
                    let index = call_counter.fetch_add(1, Ordering::Relaxed);
                    chunks.push(StreamChunk::ToolCall(ToolCallDelta {
                        index,
                        id: Some(format!("call_{index}")),
                        name: Some(call.name),
                        arguments: call.args.to_string(),
                    }));
                }
            }
        }
        if candidate.finish_reason.is_some() {
            finished = true;
        }
    }

    if finished {
        chunks.push(StreamChunk::Done);
    }
    chunks
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolBlock<'a>>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolBlock<'a> {
    function_declarations: Vec<FunctionDeclaration<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
