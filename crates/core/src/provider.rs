//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to a model and hand back a
//! stream of typed chunks. Vendor wire formats stay behind this trait; the
//! agent loop only ever sees [`StreamChunk`]s and classified [`ProviderError`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCallRequest;

/// Parameters for one model round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatParams {
    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Cancelled when the caller abandons the round (e.g. on the total deadline).
    /// Transports that can abort in-flight requests should watch it.
    #[serde(skip)]
    pub cancel: CancellationToken,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A single piece of a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Visible answer text
    Text { content: String },

    /// Reasoning text, surfaced separately from the answer
    Thinking { content: String },

    /// A complete tool invocation request
    ToolCall { call: ToolCallRequest },

    /// Token accounting for the round (may arrive more than once)
    Usage { usage: TokenUsage },
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text { content: content.into() }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking { content: content.into() }
    }

    pub fn tool_call(call: ToolCallRequest) -> Self {
        Self::ToolCall { call }
    }
}

/// Receiving half of a provider response stream.
pub type ChunkStream = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// `chat` may fail up front (before any chunk) or mid-stream by yielding an
/// `Err` item. Either way the error must be classified: retryable variants are
/// re-issued by the agent loop, `ProviderError::Unclassified` is permanent.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send one round to the model and get back a stream of chunks.
    async fn chat(&self, params: ChatParams) -> Result<ChunkStream, ProviderError>;
}
