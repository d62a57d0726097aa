use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use super::*;
use crate::chat::{ChatRole, StopReason, Usage};

/// Scripted provider double: pops one canned reply per call and counts
/// every network-shaped operation.
struct MockProvider {
    name: &'static str,
    replies: Mutex<VecDeque<Result<CompletionResponse, LLMError>>>,
    stream_scripts: Mutex<VecDeque<Vec<Result<StreamChunk, LLMError>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            replies: Mutex::new(VecDeque::new()),
            stream_scripts: Mutex::new(VecDeque::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn push_reply(&self, reply: Result<CompletionResponse, LLMError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn push_stream(&self, chunks: Vec<Result<StreamChunk, LLMError>>) {
        self.stream_scripts.lock().unwrap().push_back(chunks);
    }

    /// Handle to the call counter, usable after the provider is boxed.
    fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

fn text_reply(content: &str, usage: Option<Usage>) -> CompletionResponse {
    CompletionResponse {
        content: content.to_string(),
        tool_calls: None,
        usage,
        stop_reason: StopReason::End,
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LLMError> {
        // Adapters never see system-role entries.
        assert!(request.messages.iter().all(|m| m.role != ChatRole::System));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted reply left"))
    }

    async fn stream(&self, _request: &ChatRequest) -> Result<ChatStream, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .stream_scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted stream left"));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn conversation_with(mock: MockProvider) -> Conversation {
    Conversation::with_provider(Box::new(mock), "test system prompt", EnvConfig::new())
}

#[tokio::test]
async fn send_appends_both_sides_and_accumulates_usage() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("first", Some(Usage::new(10, 5)))));
    mock.push_reply(Ok(text_reply("second", Some(Usage::new(7, 3)))));
    let mut convo = conversation_with(mock);

    convo.send("one").await.unwrap();
    convo.send("two").await.unwrap();

    assert_eq!(convo.messages().len(), 4);
    assert_eq!(convo.messages()[3].content, "second");
    // Totals equal the sum of all reported usage.
    assert_eq!(convo.token_usage(), (17, 8));
}

#[tokio::test]
async fn send_without_reported_usage_leaves_totals_untouched() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("reply", None)));
    let mut convo = conversation_with(mock);

    convo.send("hello").await.unwrap();

    assert_eq!(convo.messages().len(), 2);
    assert_eq!(convo.token_usage(), (0, 0));
}

#[tokio::test]
async fn failed_send_keeps_user_message_but_not_assistant() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Err(LLMError::HttpError {
        status: 500,
        body: "boom".into(),
    }));
    let mut convo = conversation_with(mock);

    let err = convo.send("doomed").await.unwrap_err();
    assert!(matches!(err, LLMError::HttpError { status: 500, .. }));

    assert_eq!(convo.messages().len(), 1);
    assert_eq!(convo.messages()[0].role, ChatRole::User);
    assert_eq!(convo.messages()[0].content, "doomed");
    assert_eq!(convo.token_usage(), (0, 0));
}

#[tokio::test]
async fn streaming_turn_commits_reply_and_estimates_on_done() {
    let mock = MockProvider::named("mock");
    mock.push_stream(vec![
        Ok(StreamChunk::Text("Hel".into())),
        Ok(StreamChunk::Text("lo".into())),
        Ok(StreamChunk::Done),
    ]);
    let mut convo = conversation_with(mock);

    let mut turn = convo.send_streaming("hi there").await.unwrap();
    let mut texts = Vec::new();
    while let Some(chunk) = turn.next().await {
        if let StreamChunk::Text(t) = chunk.unwrap() {
            texts.push(t);
        }
    }
    drop(turn);

    // Chunks arrive in transport order.
    assert_eq!(texts, vec!["Hel", "lo"]);
    assert_eq!(convo.messages().len(), 2);
    assert_eq!(convo.messages()[1].content, "Hello");

    // Streaming totals use the local estimate, not provider usage:
    // ceil(8/4) = 2 input, ceil(5/4) = 2 output.
    assert_eq!(convo.token_usage(), (2, 2));
}

#[tokio::test]
async fn streaming_turn_dropped_early_appends_nothing() {
    let mock = MockProvider::named("mock");
    mock.push_stream(vec![
        Ok(StreamChunk::Text("partial".into())),
        Ok(StreamChunk::Text("never read".into())),
        Ok(StreamChunk::Done),
    ]);
    let mut convo = conversation_with(mock);

    let mut turn = convo.send_streaming("question").await.unwrap();
    let first = turn.next().await.unwrap().unwrap();
    assert_eq!(first, StreamChunk::Text("partial".into()));
    drop(turn);

    // User message stays; no assistant message, no totals.
    assert_eq!(convo.messages().len(), 1);
    assert_eq!(convo.token_usage(), (0, 0));
}

#[tokio::test]
async fn streaming_error_is_terminal_and_commits_nothing() {
    let mock = MockProvider::named("mock");
    mock.push_stream(vec![
        Ok(StreamChunk::Text("argh".into())),
        Err(LLMError::TransportError("reset".into())),
    ]);
    let mut convo = conversation_with(mock);

    let mut turn = convo.send_streaming("q").await.unwrap();
    assert!(turn.next().await.unwrap().is_ok());
    assert!(turn.next().await.unwrap().is_err());
    assert!(turn.next().await.is_none());
    drop(turn);

    assert_eq!(convo.messages().len(), 1);
    assert_eq!(convo.token_usage(), (0, 0));
}

#[tokio::test]
async fn compact_below_threshold_is_a_sentinel_not_a_call() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("reply", None)));
    let calls = mock.call_counter();
    let mut convo = conversation_with(mock);

    convo.send("only exchange").await.unwrap();
    assert_eq!(convo.messages().len(), 2);
    let calls_before = calls.load(Ordering::SeqCst);

    let result = convo.compact().await.unwrap();

    assert_eq!(result, COMPACT_TOO_SHORT);
    assert_eq!(calls.load(Ordering::SeqCst), calls_before);
    assert_eq!(convo.messages().len(), 2);
}

#[tokio::test]
async fn compact_replaces_history_and_resets_totals() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("a1", Some(Usage::new(100, 50)))));
    mock.push_reply(Ok(text_reply("a2", Some(Usage::new(100, 50)))));
    mock.push_reply(Ok(text_reply("the summary", None)));
    let mut convo = conversation_with(mock);

    convo.send("u1").await.unwrap();
    convo.send("u2").await.unwrap();
    assert_eq!(convo.token_usage(), (200, 100));

    let summary = convo.compact().await.unwrap();
    assert_eq!(summary, "the summary");

    let messages = convo.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert!(messages[0].content.contains("the summary"));
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert_eq!(messages[1].content, HANDOFF_ACK);

    // Totals now reflect only the synthetic seed, via the local
    // estimate.
    let expected_in = u64::from(messages[0].content.chars().count().div_ceil(4) as u32);
    let expected_out = u64::from(messages[1].content.chars().count().div_ceil(4) as u32);
    assert_eq!(convo.token_usage(), (expected_in, expected_out));
}

#[tokio::test]
async fn switching_to_the_same_provider_is_a_noop() {
    let mock = MockProvider::named("anthropic");
    mock.push_reply(Ok(text_reply("reply", Some(Usage::new(5, 5)))));
    let calls = mock.call_counter();
    let mut convo = conversation_with(mock);
    convo.send("hello").await.unwrap();

    let before = convo.state();
    let result = convo.switch_provider("anthropic", true).await.unwrap();

    assert!(result.is_none());
    assert_eq!(convo.state(), before);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn switching_with_compact_seeds_the_new_context() {
    let mock = MockProvider::named("openai");
    mock.push_reply(Ok(text_reply("working on it", Some(Usage::new(8, 4)))));
    mock.push_reply(Ok(text_reply("digest of the session", None)));
    let mut convo = conversation_with(mock);
    convo.send("do the thing").await.unwrap();

    let summary = convo
        .switch_provider("anthropic", true)
        .await
        .unwrap()
        .expect("summary produced");

    assert_eq!(summary, "digest of the session");
    assert_eq!(convo.provider_name(), "anthropic");

    let messages = convo.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, ChatRole::User);
    assert!(messages[0].content.contains("digest of the session"));
    assert_eq!(messages[1].content, HANDOFF_ACK);

    // Switching compacts history but keeps the running totals.
    assert_eq!(convo.token_usage(), (8, 4));
}

#[tokio::test]
async fn switching_without_compact_carries_history_verbatim() {
    let mock = MockProvider::named("openai");
    mock.push_reply(Ok(text_reply("sure", None)));
    let mut convo = conversation_with(mock);
    convo.send("keep this").await.unwrap();
    let history = convo.messages().to_vec();

    let result = convo.switch_provider("google", false).await.unwrap();

    assert!(result.is_none());
    assert_eq!(convo.provider_name(), "google");
    assert_eq!(convo.messages(), history.as_slice());
}

#[tokio::test]
async fn unknown_provider_aborts_the_switch() {
    let mock = MockProvider::named("openai");
    mock.push_reply(Ok(text_reply("hi", None)));
    let calls = mock.call_counter();
    let mut convo = conversation_with(mock);
    convo.send("hello").await.unwrap();
    let before = convo.state();
    let calls_before = calls.load(Ordering::SeqCst);

    let err = convo.switch_provider("llama9000", true).await.unwrap_err();

    assert!(matches!(err, LLMError::UnknownProvider(_)));
    assert_eq!(convo.provider_name(), "openai");
    assert_eq!(convo.state(), before);
    // No summarization was attempted.
    assert_eq!(calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test]
async fn clear_resets_history_and_counters_only() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("reply", Some(Usage::new(9, 9)))));
    let mut convo = conversation_with(mock);
    convo.send("hello").await.unwrap();

    convo.clear();

    assert!(convo.messages().is_empty());
    assert_eq!(convo.token_usage(), (0, 0));
    assert_eq!(convo.provider_name(), "mock");

    // Percentage now derives from the system prompt alone:
    // "test system prompt" is 18 chars -> ceil(18/4) = 5 tokens.
    let mut convo = convo.with_max_context(1000);
    convo.clear();
    assert_eq!(convo.context_percentage(), 1);
}

#[tokio::test]
async fn context_percentage_walks_current_history() {
    let mock = MockProvider::named("mock");
    // 40-char user message + 40-char reply.
    mock.push_reply(Ok(text_reply(&"b".repeat(40), None)));
    let mut convo = conversation_with(mock).with_max_context(100);

    // prompt 18 chars -> 5 tokens -> 5%.
    assert_eq!(convo.context_percentage(), 5);

    convo.send("a".repeat(40)).await.unwrap();
    // 5 + 10 + 10 tokens of 100 -> 25%.
    assert_eq!(convo.context_percentage(), 25);
}

#[tokio::test]
async fn state_round_trip_restores_identical_behavior() {
    let mock = MockProvider::named("anthropic");
    mock.push_reply(Ok(text_reply("first answer", Some(Usage::new(6, 2)))));
    let mut original = conversation_with(mock).with_max_context(500);
    original.send("first question").await.unwrap();

    let snapshot = original.state();

    // Serializable for the session-persistence layer.
    let json = serde_json::to_string(&snapshot).unwrap();
    let restored_state: ConversationState = serde_json::from_str(&json).unwrap();

    let mut restored = Conversation::new("openai", "other prompt", EnvConfig::new())
        .unwrap()
        .with_max_context(500);
    restored.load_state(restored_state).unwrap();

    assert_eq!(restored.provider_name(), "anthropic");
    assert_eq!(restored.messages(), original.messages());
    assert_eq!(restored.token_usage(), original.token_usage());
    assert_eq!(
        restored.context_percentage(),
        original.context_percentage()
    );
}

#[tokio::test]
async fn load_state_failure_leaves_conversation_untouched() {
    let mock = MockProvider::named("mock");
    mock.push_reply(Ok(text_reply("hi", None)));
    let mut convo = conversation_with(mock);
    convo.send("hello").await.unwrap();
    let before = convo.state();

    let bad = ConversationState {
        provider: "nonexistent".into(),
        messages: Vec::new(),
        total_input_tokens: 0,
        total_output_tokens: 0,
        system_prompt: String::new(),
    };

    assert!(matches!(
        convo.load_state(bad),
        Err(LLMError::UnknownProvider(_))
    ));
    assert_eq!(convo.state(), before);
}
