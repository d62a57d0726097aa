use std::pin::Pin;

use futures::stream::Stream;

use crate::error::LLMError;

/// A streaming chat response, one normalized chunk at a time.
///
/// Finite and non-restartable. Terminates with exactly one
/// [`StreamChunk::Done`] (normal path) or one `Err` item (abnormal path),
/// never both. Dropping the stream at any point releases the underlying
/// network connection.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LLMError>> + Send>>;

/// One unit of a provider's incremental response, normalized across
/// backends.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Tool invocation event, possibly partial
    ToolCall(ToolCallDelta),
    /// Stream finished; no further chunks follow
    Done,
}

/// Partial tool-call descriptor observed mid-stream.
///
/// Carries whatever identifying fields the provider has emitted at that
/// point; `arguments` accumulates raw JSON text and is not required to
/// be valid JSON until the call is complete.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolCallDelta {
    /// Position of this tool call within the response
    pub index: usize,
    /// Provider-supplied or synthesized call id, once known
    pub id: Option<String>,
    /// Tool name, once known
    pub name: Option<String>,
    /// Raw (possibly partial) JSON arguments delta
    pub arguments: String,
}
