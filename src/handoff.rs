//! Handoff summarization: condensing a conversation so it can continue
//! under a different backend or a fresh context window.

use crate::chat::{ChatMessage, ChatProvider, ChatRequest, ChatRole};
use crate::error::LLMError;

/// Token budget for the summary itself; a digest that needs more than
/// this is defeating the point of compaction.
const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Asks `provider` for a compact, context-preserving digest of
/// `messages`.
///
/// Issues exactly one non-streaming completion and returns its text
/// verbatim. The input history is not mutated; provider failures
/// propagate unchanged with no retry or fallback. An empty history is
/// rejected without calling the provider.
pub async fn generate_handoff_summary(
    provider: &dyn ChatProvider,
    messages: &[ChatMessage],
) -> Result<String, LLMError> {
    if messages.is_empty() {
        return Err(LLMError::InvalidRequest(
            "Cannot summarize an empty conversation".to_string(),
        ));
    }

    let prompt = build_summary_prompt(messages);
    let request = ChatRequest::new(vec![ChatMessage::user().content(prompt).build()])
        .max_tokens(SUMMARY_MAX_TOKENS)
        .temperature(0.3);

    let response = provider.complete(&request).await?;
    Ok(response.content)
}

fn build_summary_prompt(messages: &[ChatMessage]) -> String {
    let mut transcript = Vec::with_capacity(messages.len());
    for msg in messages {
        transcript.push(format!("{}: {}", role_label(msg.role), msg.content));
    }

    format!(
        "Summarize the following conversation so that another assistant can \
         pick it up seamlessly. Preserve the user's goals, decisions already \
         made, any code or file references, and work still pending. Reply \
         with the summary only.\n\n{}",
        transcript.join("\n")
    )
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "User",
        ChatRole::Assistant => "Assistant",
        ChatRole::System => "System",
    }
}
