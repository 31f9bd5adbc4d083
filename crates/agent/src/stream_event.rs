//! Agent loop events.
//!
//! `AgentEvent` is what a loop invocation streams to its consumer: model text
//! as it arrives, tool activity, classified errors, and exactly one final
//! `done` carrying cumulative usage.

use serde::{Deserialize, Serialize};
use switchyard_core::error::ErrorInfo;
use switchyard_core::provider::TokenUsage;
use switchyard_core::tool::{ToolCallRequest, ToolResult};

/// Events emitted by one agent loop invocation.
///
/// - `message_delta`  — answer text, forwarded as the provider streams it
/// - `thinking_delta` — reasoning text, forwarded the same way
/// - `tool_call`      — the loop is about to execute a tool
/// - `tool_result`    — the tool returned (successfully or not)
/// - `error`          — a classified failure; `terminal` ones end the loop
/// - `done`           — always the last event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    MessageDelta { content: String },

    ThinkingDelta { content: String },

    ToolCall { call: ToolCallRequest },

    ToolResult { result: ToolResult },

    Error { error: ErrorInfo, terminal: bool },

    Done {
        usage: TokenUsage,
        iterations: usize,
        tool_calls_made: usize,
    },
}

impl AgentEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageDelta { .. } => "message_delta",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_terminal_error(&self) -> bool {
        matches!(self, Self::Error { terminal: true, .. })
    }
}
