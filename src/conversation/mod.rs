//! The conversation engine: message history, token accounting, and
//! orchestration of send/stream/switch/compact against the active
//! provider adapter.

mod state;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;

use crate::backends;
use crate::chat::{
    ChatMessage, ChatProvider, ChatRequest, ChatStream, CompletionResponse, StreamChunk, Tool,
};
use crate::config::EnvConfig;
use crate::error::LLMError;
use crate::handoff;

pub use state::ConversationState;

/// Default context window assumed for percentage estimation.
pub const DEFAULT_MAX_CONTEXT_TOKENS: u32 = 200_000;

/// History below this length is not worth a summarization call.
const MIN_COMPACT_MESSAGES: usize = 4;

/// Returned by [`Conversation::compact`] when history is too short.
pub const COMPACT_TOO_SHORT: &str = "Not enough messages to compact";

/// Fixed acknowledgment seeded as the assistant half of a handoff.
pub const HANDOFF_ACK: &str =
    "Understood. I have the prior context and will continue from here.";

/// A running conversation against one of the supported backends.
///
/// Owns its message history and token counters exclusively; at most one
/// operation may be in flight at a time. On adapter failure the history
/// is never corrupted beyond the documented "user message appended,
/// assistant message absent" case of [`Conversation::send`].
pub struct Conversation {
    provider: Box<dyn ChatProvider>,
    env: EnvConfig,
    messages: Vec<ChatMessage>,
    system_prompt: String,
    total_input_tokens: u64,
    total_output_tokens: u64,
    max_context_tokens: u32,
    tools: Option<Vec<Tool>>,
}

impl Conversation {
    /// Creates a conversation on the named provider, resolving its
    /// credential from `env`.
    pub fn new(
        provider_name: &str,
        system_prompt: impl Into<String>,
        env: EnvConfig,
    ) -> Result<Self, LLMError> {
        let provider = backends::create_provider(provider_name, &env)?;
        Ok(Self::with_provider(provider, system_prompt, env))
    }

    /// Creates a conversation on an already-constructed adapter.
    pub fn with_provider(
        provider: Box<dyn ChatProvider>,
        system_prompt: impl Into<String>,
        env: EnvConfig,
    ) -> Self {
        Self {
            provider,
            env,
            messages: Vec::new(),
            system_prompt: system_prompt.into(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            tools: None,
        }
    }

    /// Sets the context-window size used by [`Self::context_percentage`].
    pub fn with_max_context(mut self, max_context_tokens: u32) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    /// Tools forwarded with every request. The engine routes tool-call
    /// requests back to the caller and never interprets their results.
    pub fn set_tools(&mut self, tools: Option<Vec<Tool>>) {
        self.tools = tools;
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Name of the active provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The active adapter.
    pub fn provider(&self) -> &dyn ChatProvider {
        self.provider.as_ref()
    }

    /// Current message history, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Accumulated `(input, output)` token totals.
    ///
    /// Exact where providers reported usage, locally estimated for
    /// streamed turns; the two are never reconciled.
    pub fn token_usage(&self) -> (u64, u64) {
        (self.total_input_tokens, self.total_output_tokens)
    }

    /// Sends a user message and waits for the complete response.
    ///
    /// The user message stays in history even when the provider fails;
    /// the assistant message and token totals are only touched on
    /// success, and totals only when the provider reported usage.
    pub async fn send(
        &mut self,
        user_text: impl Into<String>,
    ) -> Result<CompletionResponse, LLMError> {
        self.messages
            .push(ChatMessage::user().content(user_text).build());

        let request = self.build_request();
        let response = self.provider.complete(&request).await?;

        self.messages
            .push(ChatMessage::assistant().content(response.content.as_str()).build());
        if let Some(usage) = response.usage {
            self.total_input_tokens += u64::from(usage.input_tokens);
            self.total_output_tokens += u64::from(usage.output_tokens);
        }
        Ok(response)
    }

    /// Sends a user message and streams the response chunk-by-chunk.
    ///
    /// The user message is appended before any network activity. Once the
    /// stream reaches [`StreamChunk::Done`], the concatenated text is
    /// appended as the assistant message and the totals grow by the local
    /// token estimate of both sides of the turn; providers may omit usage
    /// on streaming responses, so streamed accounting is an estimate by
    /// design. Dropping the stream early appends nothing further.
    pub async fn send_streaming(
        &mut self,
        user_text: impl Into<String>,
    ) -> Result<StreamingTurn<'_>, LLMError> {
        let user_text = user_text.into();
        self.messages
            .push(ChatMessage::user().content(user_text.clone()).build());

        let request = self.build_request();
        let inner = self.provider.stream(&request).await?;

        Ok(StreamingTurn {
            conversation: self,
            inner,
            user_text,
            buffer: String::new(),
            finished: false,
        })
    }

    /// Switches the active provider, optionally compacting history into
    /// a handoff seed first.
    ///
    /// Same-name switches are a no-op returning `None`. An unrecognized
    /// name aborts before anything is summarized or replaced, leaving
    /// the previous adapter active. With `compact` false the history is
    /// carried as-is (plain role/text pairs are portable across
    /// backends).
    pub async fn switch_provider(
        &mut self,
        name: &str,
        compact: bool,
    ) -> Result<Option<String>, LLMError> {
        let next = backends::create_provider(name, &self.env)?;
        if next.name() == self.provider.name() {
            return Ok(None);
        }

        let mut summary = None;
        if compact && !self.messages.is_empty() {
            let text =
                handoff::generate_handoff_summary(self.provider.as_ref(), &self.messages).await?;
            self.replace_history_with_handoff(&text);
            summary = Some(text);
        }

        self.provider = next;
        Ok(summary)
    }

    /// Compacts history into a handoff seed on the current provider.
    ///
    /// Below [`MIN_COMPACT_MESSAGES`] this returns the
    /// [`COMPACT_TOO_SHORT`] sentinel without calling the provider.
    /// Otherwise the totals are reset to the local estimate of the two
    /// synthetic messages; compaction deliberately discards all prior
    /// accounting.
    pub async fn compact(&mut self) -> Result<String, LLMError> {
        if self.messages.len() < MIN_COMPACT_MESSAGES {
            return Ok(COMPACT_TOO_SHORT.to_string());
        }

        let summary =
            handoff::generate_handoff_summary(self.provider.as_ref(), &self.messages).await?;
        self.replace_history_with_handoff(&summary);

        self.total_input_tokens = u64::from(self.provider.count_tokens(&self.messages[0].content));
        self.total_output_tokens =
            u64::from(self.provider.count_tokens(&self.messages[1].content));

        Ok(summary)
    }

    /// Empties history and zeroes the counters; the active provider and
    /// system prompt are untouched.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.total_input_tokens = 0;
        self.total_output_tokens = 0;
    }

    /// Estimated share of the context window currently consumed, in
    /// whole percent.
    ///
    /// Always a fresh walk of the system prompt plus current history
    /// (not the running totals), so it reflects compaction and clearing
    /// immediately.
    pub fn context_percentage(&self) -> u32 {
        let mut estimated = self.provider.count_tokens(&self.system_prompt);
        for msg in &self.messages {
            estimated += self.provider.count_tokens(&msg.content);
        }
        ((f64::from(estimated) / f64::from(self.max_context_tokens)) * 100.0).round() as u32
    }

    /// Immutable snapshot of the conversation.
    pub fn state(&self) -> ConversationState {
        ConversationState {
            provider: self.provider.name().to_string(),
            messages: self.messages.clone(),
            total_input_tokens: self.total_input_tokens,
            total_output_tokens: self.total_output_tokens,
            system_prompt: self.system_prompt.clone(),
        }
    }

    /// Restores a snapshot, reconstructing the adapter from the stored
    /// provider name.
    ///
    /// Applied atomically from the caller's perspective: a factory
    /// failure leaves the conversation untouched.
    pub fn load_state(&mut self, state: ConversationState) -> Result<(), LLMError> {
        let provider = backends::create_provider(&state.provider, &self.env)?;
        self.provider = provider;
        self.messages = state.messages;
        self.total_input_tokens = state.total_input_tokens;
        self.total_output_tokens = state.total_output_tokens;
        self.system_prompt = state.system_prompt;
        Ok(())
    }

    fn build_request(&self) -> ChatRequest {
        let mut request = ChatRequest::new(self.messages.clone());
        if !self.system_prompt.is_empty() {
            request = request.system(self.system_prompt.clone());
        }
        if let Some(tools) = &self.tools {
            request = request.tools(tools.clone());
        }
        request
    }

    fn replace_history_with_handoff(&mut self, summary: &str) {
        self.messages = vec![
            ChatMessage::user()
                .content(format!(
                    "[Context handoff]\nSummary of the conversation so far:\n\n{summary}"
                ))
                .build(),
            ChatMessage::assistant().content(HANDOFF_ACK).build(),
        ];
    }

    fn finish_streaming_turn(&mut self, user_text: &str, reply: &str) {
        self.messages
            .push(ChatMessage::assistant().content(reply).build());
        self.total_input_tokens += u64::from(self.provider.count_tokens(user_text));
        self.total_output_tokens += u64::from(self.provider.count_tokens(reply));
    }
}

/// One in-flight streaming exchange.
///
/// Forwards the adapter's chunks in arrival order while buffering the
/// text deltas; when the underlying stream reports `Done`, the buffered
/// reply is committed to the conversation exactly once. Dropping the
/// turn early drops the network stream with it.
pub struct StreamingTurn<'a> {
    conversation: &'a mut Conversation,
    inner: ChatStream,
    user_text: String,
    buffer: String,
    finished: bool,
}

impl Stream for StreamingTurn<'_> {
    type Item = Result<StreamChunk, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(StreamChunk::Text(text)))) => {
                this.buffer.push_str(&text);
                Poll::Ready(Some(Ok(StreamChunk::Text(text))))
            }
            Poll::Ready(Some(Ok(StreamChunk::Done))) => {
                this.finished = true;
                this.conversation
                    .finish_streaming_turn(&this.user_text, &this.buffer);
                Poll::Ready(Some(Ok(StreamChunk::Done)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finished = true;
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
