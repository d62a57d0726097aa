use async_trait::async_trait;

use crate::error::LLMError;

use super::request::ChatRequest;
use super::response::CompletionResponse;
use super::stream::ChatStream;

/// Trait implemented by every provider adapter.
///
/// An adapter translates the unified [`ChatRequest`] into one backend's
/// wire format and normalizes the response or event stream back into the
/// unified shapes. Adapters hold only immutable credential and model
/// configuration and are safe to reuse across calls.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Canonical provider name, as accepted by the factory.
    fn name(&self) -> &'static str;

    /// True iff a usable credential was resolved at construction.
    ///
    /// Precondition check only; no network call is made to validate the
    /// credential.
    fn is_configured(&self) -> bool;

    /// Issues one blocking request to the provider's non-streaming
    /// endpoint and parses the response into a [`CompletionResponse`].
    ///
    /// Non-2xx statuses surface as [`LLMError::HttpError`]; no retries.
    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LLMError>;

    /// Issues one request to the provider's streaming endpoint and
    /// returns the incrementally decoded event stream.
    ///
    /// The returned stream always terminates with exactly one
    /// [`super::StreamChunk::Done`], synthesized if the transport ends
    /// without an explicit terminal event.
    async fn stream(&self, request: &ChatRequest) -> Result<ChatStream, LLMError>;

    /// Fast local token estimate used for budget bookkeeping.
    ///
    /// Deterministic for a given input and provider. Never reconciled
    /// with provider-reported usage, which is authoritative when present
    /// on a [`CompletionResponse`].
    fn count_tokens(&self, text: &str) -> u32 {
        (text.chars().count() as u32).div_ceil(4)
    }
}
