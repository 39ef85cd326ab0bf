//! Streaming LLM provider abstraction and the Ollama backend.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use error::LlmError;
pub use provider::{ChatStream, LlmProvider, Message, Role, StreamChunk, ToolDefinition, ToolUseRequest};
