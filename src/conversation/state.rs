use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Immutable snapshot of a conversation, suitable for serialization by a
/// session-persistence layer.
///
/// Carries everything needed to restore the conversation, including the
/// active provider by name; [`super::Conversation::load_state`] rebuilds
/// the adapter through the factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Name of the active provider
    pub provider: String,
    /// Full message history, oldest first
    pub messages: Vec<ChatMessage>,
    /// Accumulated input token count
    pub total_input_tokens: u64,
    /// Accumulated output token count
    pub total_output_tokens: u64,
    /// The out-of-band system prompt
    pub system_prompt: String,
}
