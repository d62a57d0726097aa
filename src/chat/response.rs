use serde::{Deserialize, Serialize};

use super::tool::ToolCall;
use super::usage::Usage;

/// Why a completion stopped.
///
/// Every provider's terminal-reason vocabulary collapses onto this
/// three-way enum; unrecognized reasons map to [`StopReason::End`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of turn
    #[default]
    End,
    /// Output truncated at the token budget
    MaxTokens,
    /// The model is requesting one or more tool invocations
    ToolUse,
}

/// Unified result of one non-streaming completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// All text segments of the response, concatenated in order
    pub content: String,
    /// Tool invocations requested by the model, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Provider-reported token usage, when the provider supplies it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Why the completion stopped
    pub stop_reason: StopReason,
}
