mod message;
mod request;
mod response;
mod sse;
mod stream;
mod tool;
mod traits;
mod usage;

pub use message::{ChatMessage, ChatMessageBuilder, ChatRole};
pub use request::{ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
pub use response::{CompletionResponse, StopReason};
pub use stream::{ChatStream, StreamChunk, ToolCallDelta};
pub use tool::{FunctionTool, Tool, ToolCall};
pub use traits::ChatProvider;
pub use usage::Usage;

pub(crate) use sse::create_sse_stream;
