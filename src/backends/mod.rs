//! Provider adapters and the factory that constructs them by name.

pub mod anthropic;
pub mod google;
pub mod openai;

use std::str::FromStr;

use crate::chat::ChatProvider;
use crate::config::EnvConfig;
use crate::error::LLMError;

pub use anthropic::Anthropic;
pub use google::Google;
pub use openai::OpenAI;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMBackend {
    Anthropic,
    Google,
    OpenAI,
}

impl LLMBackend {
    /// Canonical name, as reported by the adapter's `name()`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LLMBackend::Anthropic => "anthropic",
            LLMBackend::Google => "google",
            LLMBackend::OpenAI => "openai",
        }
    }
}

impl FromStr for LLMBackend {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(LLMBackend::Anthropic),
            "google" | "gemini" => Ok(LLMBackend::Google),
            "openai" => Ok(LLMBackend::OpenAI),
            _ => Err(LLMError::UnknownProvider(s.to_string())),
        }
    }
}

/// Constructs the adapter for `name`, resolving its credential from
/// `env`.
///
/// Pure construction: no network I/O, no credential validation. Each
/// adapter reads only its own variables, so swapping providers never
/// depends on unrelated configuration.
pub fn create_provider(name: &str, env: &EnvConfig) -> Result<Box<dyn ChatProvider>, LLMError> {
    let backend = LLMBackend::from_str(name)?;
    Ok(match backend {
        LLMBackend::Anthropic => Box::new(Anthropic::new(env, None, None)),
        LLMBackend::Google => Box::new(Google::new(env, None, None)),
        LLMBackend::OpenAI => Box::new(OpenAI::new(env, None, None)),
    })
}
