//! # handoff
//!
//! A Rust library unifying multiple LLM backends behind one conversation
//! engine.
//!
//! The crate normalizes three independently-shaped completion APIs
//! (Anthropic, Google Gemini, OpenAI) into a single request/response/
//! stream-chunk model, tracks token and context budget, and performs
//! provider switching with context handoff: summarizing and compacting a
//! conversation so it can continue under a different backend or a fresh
//! context window.
//!
//! ## Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use handoff::{Conversation, EnvConfig, StreamChunk};
//!
//! # async fn run() -> Result<(), handoff::LLMError> {
//! let env = EnvConfig::from_process_env();
//! let mut convo = Conversation::new("anthropic", "You are a coding assistant.", env)?;
//!
//! let reply = convo.send("Rename the parser module to `syntax`.").await?;
//! println!("{}", reply.content);
//!
//! let mut turn = convo.send_streaming("Now update the imports.").await?;
//! while let Some(chunk) = turn.next().await {
//!     if let StreamChunk::Text(text) = chunk? {
//!         print!("{text}");
//!     }
//! }
//!
//! // Continue the same conversation on a different backend.
//! let summary = convo.switch_provider("openai", true).await?;
//! println!("handed off with summary: {summary:?}");
//! # Ok(())
//! # }
//! ```
//!
//! The engine performs no retries, no rate limiting, and no durable
//! persistence; callers own those policies. [`Conversation::state`] and
//! [`Conversation::load_state`] expose a serializable snapshot for a
//! session-persistence layer.

pub mod backends;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod handoff;

pub use backends::{create_provider, LLMBackend};
pub use chat::{
    ChatMessage, ChatProvider, ChatRequest, ChatRole, ChatStream, CompletionResponse,
    FunctionTool, StopReason, StreamChunk, Tool, ToolCall, ToolCallDelta, Usage,
};
pub use config::EnvConfig;
pub use conversation::{
    Conversation, ConversationState, StreamingTurn, COMPACT_TOO_SHORT, HANDOFF_ACK,
};
pub use error::LLMError;
pub use handoff::generate_handoff_summary;
