use serde::{Deserialize, Serialize};

/// Usage metadata for a chat response.
///
/// Provider-reported counts; authoritative when present, absent on
/// streaming responses from most backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    #[serde(alias = "prompt_tokens", alias = "promptTokenCount")]
    pub input_tokens: u32,
    /// Number of tokens in the completion
    #[serde(alias = "completion_tokens", alias = "candidatesTokenCount")]
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Combined prompt and completion token count.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
