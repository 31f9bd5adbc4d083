//! Shared test helpers for agent tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use switchyard_core::error::{ProviderError, ToolError};
use switchyard_core::message::Message;
use switchyard_core::provider::{ChatParams, ChunkStream, Provider, StreamChunk, TokenUsage, ToolDefinition};
use switchyard_core::tool::{ToolCallRequest, ToolExecutor, ToolResult};
use tokio::sync::mpsc;

/// What the provider does for one round.
#[derive(Clone)]
pub enum Round {
    /// Stream these items, then close.
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    /// Fail before streaming anything.
    Reject(ProviderError),
    /// Never answer.
    Hang,
}

/// A mock provider that plays back scripted rounds.
///
/// Each call to `chat` consumes the next round; the last one repeats forever.
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(rounds: Vec<Round>) -> Self {
        assert!(!rounds.is_empty(), "ScriptedProvider needs at least one round");
        Self {
            rounds: Mutex::new(rounds.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers with a single text chunk.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_round(&[text])])
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// The messages sent on each call, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }

    fn next_round(&self) -> Round {
        let mut rounds = self.rounds.lock().unwrap();
        if rounds.len() > 1 {
            rounds.pop_front().unwrap()
        } else {
            rounds.front().cloned().unwrap()
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, params: ChatParams) -> Result<ChunkStream, ProviderError> {
        self.seen.lock().unwrap().push(params.messages.clone());
        match self.next_round() {
            Round::Reject(err) => Err(err),
            Round::Hang => {
                params.cancel.cancelled().await;
                Err(ProviderError::Network("cancelled".into()))
            }
            Round::Chunks(items) => {
                let (tx, rx) = mpsc::channel(items.len().max(1));
                for item in items {
                    tx.send(item).await.unwrap();
                }
                Ok(rx)
            }
        }
    }
}

/// A round that streams the given text pieces followed by a usage report.
pub fn text_round(pieces: &[&str]) -> Round {
    let mut items: Vec<_> = pieces.iter().map(|p| Ok(StreamChunk::text(*p))).collect();
    items.push(Ok(usage_chunk(10, 5)));
    Round::Chunks(items)
}

/// A round that requests one tool call.
pub fn tool_round(tool_name: &str, call_id: &str) -> Round {
    Round::Chunks(vec![
        Ok(StreamChunk::tool_call(ToolCallRequest {
            tool_name: tool_name.into(),
            args: serde_json::json!({}),
            call_id: call_id.into(),
        })),
        Ok(usage_chunk(10, 5)),
    ])
}

pub fn usage_chunk(input_tokens: u64, output_tokens: u64) -> StreamChunk {
    StreamChunk::Usage {
        usage: TokenUsage {
            input_tokens,
            output_tokens,
        },
    }
}

/// What the scripted executor does for every call.
#[derive(Clone)]
pub enum ToolBehavior {
    Succeed(String),
    /// Return a result with `success: false`.
    Fail(String),
    Throw(String),
    ThrowRetryable(String),
    Stall,
}

/// A tool executor that behaves the same way for every call.
pub struct ScriptedExecutor {
    behavior: ToolBehavior,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(behavior: ToolBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(output: &str) -> Self {
        Self::new(ToolBehavior::Succeed(output.into()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "current_time".into(),
            description: "Current UTC time".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }]
    }

    async fn execute(&self, request: &ToolCallRequest, _timeout: Duration) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(request.tool_name.clone());
        match &self.behavior {
            ToolBehavior::Succeed(output) => {
                let mut result = ToolResult::ok(output.clone());
                result.call_id = request.call_id.clone();
                Ok(result)
            }
            ToolBehavior::Fail(reason) => {
                let mut result = ToolResult::failed(reason.clone());
                result.call_id = request.call_id.clone();
                Ok(result)
            }
            ToolBehavior::Throw(reason) | ToolBehavior::ThrowRetryable(reason) => Err(ToolError::ExecutionFailed {
                tool_name: request.tool_name.clone(),
                reason: reason.clone(),
                retryable: matches!(self.behavior, ToolBehavior::ThrowRetryable(_)),
            }),
            ToolBehavior::Stall => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
