//! Provider-neutral chat types and the `LlmClient` contract shared by Kite providers.
mod types;

pub use types::{
    ChatRequest, ChatResponse, ChatUsage, ContentBlock, KiteAiError, LlmClient, Message,
    MessageRole, StreamDeltaHandler, ToolCall, ToolDefinition,
};
