//! The agent reasoning loop implementation.
//!
//! One invocation alternates model rounds and tool executions until the model
//! answers without requesting tools, something fails terminally, or a limit is
//! hit. Progress is streamed as [`AgentEvent`]s from a spawned task; the last
//! event is always exactly one `done`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use switchyard_config::AgentLoopConfig;
use switchyard_core::error::{ErrorInfo, ProviderError, ToolError};
use switchyard_core::event::{DomainEvent, EventBus};
use switchyard_core::message::{Message, MessageToolCall};
use switchyard_core::provider::{ChatParams, Provider, StreamChunk, TokenUsage, ToolDefinition};
use switchyard_core::tool::{ToolCallRequest, ToolExecutor};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stream_event::AgentEvent;

/// Caller misuse, reported before anything is spawned.
#[derive(Debug, thiserror::Error)]
pub enum AgentLoopError {
    #[error("max_iterations must be at least 1")]
    ZeroIterations,

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Everything one invocation needs.
pub struct AgentRunRequest {
    /// The conversation so far (typically system + user)
    pub messages: Vec<Message>,

    /// Tools offered to the model
    pub tools: Vec<ToolDefinition>,

    pub provider: Arc<dyn Provider>,

    pub tool_executor: Arc<dyn ToolExecutor>,

    pub config: AgentLoopConfig,
}

/// The consumer side of a running invocation.
pub struct AgentRun {
    rx: mpsc::Receiver<AgentEvent>,
}

impl AgentRun {
    /// Next event, or `None` once the loop task has finished.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> ReceiverStream<AgentEvent> {
        ReceiverStream::new(self.rx)
    }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

/// Runs agent invocations. Cheap to clone and share between handlers.
#[derive(Clone, Default)]
pub struct AgentLoop {
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a `ToolExecuted` domain event for every executed tool.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Start an invocation. Must be called from within a Tokio runtime.
    pub fn run(&self, request: AgentRunRequest) -> Result<AgentRun, AgentLoopError> {
        validate(&request.config)?;

        let (tx, rx) = mpsc::channel(request.config.event_buffer);
        let task = LoopTask {
            provider: request.provider,
            tool_executor: request.tool_executor,
            tools: request.tools,
            config: request.config,
            event_bus: self.event_bus.clone(),
            tx,
        };
        tokio::spawn(task.run(request.messages));

        Ok(AgentRun { rx })
    }
}

fn validate(config: &AgentLoopConfig) -> Result<(), AgentLoopError> {
    if config.max_iterations == 0 {
        return Err(AgentLoopError::ZeroIterations);
    }
    if config.tool_timeout_ms == 0 {
        return Err(AgentLoopError::ZeroLimit("tool_timeout_ms"));
    }
    if config.total_timeout_ms == 0 {
        return Err(AgentLoopError::ZeroLimit("total_timeout_ms"));
    }
    if config.event_buffer == 0 {
        return Err(AgentLoopError::ZeroLimit("event_buffer"));
    }
    Ok(())
}

#[derive(Default)]
struct Progress {
    usage: TokenUsage,
    iterations: usize,
    tool_calls_made: usize,
}

/// What one successful model round produced.
struct RoundOutput {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
}

/// A failed round, and whether any of it already reached the consumer.
struct RoundFailure {
    error: ProviderError,
    forwarded: bool,
}

struct LoopTask {
    provider: Arc<dyn Provider>,
    tool_executor: Arc<dyn ToolExecutor>,
    tools: Vec<ToolDefinition>,
    config: AgentLoopConfig,
    event_bus: Option<Arc<EventBus>>,
    tx: mpsc::Sender<AgentEvent>,
}

impl LoopTask {
    async fn run(self, messages: Vec<Message>) {
        let mut progress = Progress::default();
        let cancel = CancellationToken::new();
        let total = Duration::from_millis(self.config.total_timeout_ms);

        let outcome = tokio::time::timeout(total, self.drive(messages, &mut progress, &cancel)).await;
        if outcome.is_err() {
            cancel.cancel();
            warn!(
                total_timeout_ms = self.config.total_timeout_ms,
                iterations = progress.iterations,
                "Agent loop hit its total deadline"
            );
            self.emit(AgentEvent::Error {
                error: ErrorInfo::timeout(format!(
                    "agent loop exceeded its total timeout of {}ms",
                    self.config.total_timeout_ms
                )),
                terminal: true,
            })
            .await;
        }

        info!(
            iterations = progress.iterations,
            tool_calls = progress.tool_calls_made,
            input_tokens = progress.usage.input_tokens,
            output_tokens = progress.usage.output_tokens,
            "Agent loop finished"
        );
        self.emit(AgentEvent::Done {
            usage: progress.usage,
            iterations: progress.iterations,
            tool_calls_made: progress.tool_calls_made,
        })
        .await;
    }

    /// Rounds until a final answer or a terminal error. Terminal errors are
    /// emitted here; the caller only adds `done`.
    async fn drive(&self, mut messages: Vec<Message>, progress: &mut Progress, cancel: &CancellationToken) {
        let max = self.config.max_iterations;

        loop {
            if self.tx.is_closed() {
                debug!("Agent event consumer went away, stopping");
                return;
            }
            if progress.iterations == max {
                warn!(max_iterations = max, "Agent loop hit its iteration limit");
                self.emit(AgentEvent::Error {
                    error: ErrorInfo::permanent(format!("iteration limit of {max} reached without a final answer")),
                    terminal: true,
                })
                .await;
                return;
            }

            progress.iterations += 1;
            debug!(iteration = progress.iterations, messages = messages.len(), "Starting model round");

            let Some(round) = self.round_with_retry(&messages, progress, cancel).await else {
                return;
            };

            if round.tool_calls.is_empty() {
                debug!(iteration = progress.iterations, "Model answered without tool calls");
                return;
            }

            messages.push(Message::assistant_with_tools(
                round.text,
                round
                    .tool_calls
                    .iter()
                    .map(|c| MessageToolCall {
                        id: c.call_id.clone(),
                        name: c.tool_name.clone(),
                        arguments: c.args.clone(),
                    })
                    .collect(),
            ));

            for call in round.tool_calls {
                if progress.tool_calls_made >= max {
                    // Every requested call still needs a matching tool message.
                    messages.push(Message::tool_result(
                        call.call_id,
                        "Error: tool call limit reached, call not executed",
                    ));
                    continue;
                }
                progress.tool_calls_made += 1;
                let output = self.execute_tool(call.clone()).await;
                messages.push(Message::tool_result(call.call_id, output));
            }
        }
    }

    /// One round, re-issued while it fails retryably before forwarding anything.
    /// `None` means a terminal error was emitted.
    async fn round_with_retry(
        &self,
        messages: &[Message],
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Option<RoundOutput> {
        let mut backoff_ms = self.config.retry_backoff_ms;
        let mut attempt = 1u32;

        loop {
            match self.stream_round(messages, progress, cancel).await {
                Ok(round) => return Some(round),
                Err(RoundFailure { error, forwarded }) if error.is_retryable() && !forwarded => {
                    let delay_ms = match &error {
                        ProviderError::RateLimited { retry_after_secs } => {
                            backoff_ms.max(retry_after_secs.saturating_mul(1000))
                        }
                        _ => backoff_ms,
                    };
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms,
                        error = %error,
                        "Retryable provider error, re-issuing round"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(self.config.max_retry_backoff_ms);
                    attempt += 1;
                }
                Err(RoundFailure { error, forwarded }) => {
                    warn!(
                        provider = self.provider.name(),
                        forwarded,
                        error = %error,
                        "Provider round failed"
                    );
                    self.emit(AgentEvent::Error {
                        error: ErrorInfo::from(&error),
                        terminal: true,
                    })
                    .await;
                    return None;
                }
            }
        }
    }

    async fn stream_round(
        &self,
        messages: &[Message],
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<RoundOutput, RoundFailure> {
        let params = ChatParams {
            messages: messages.to_vec(),
            tools: self.tools.clone(),
            stream: self.config.streaming_enabled,
            cancel: cancel.clone(),
        };

        let mut stream_rx = self
            .provider
            .chat(params)
            .await
            .map_err(|error| RoundFailure { error, forwarded: false })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut forwarded = false;

        while let Some(chunk_result) = stream_rx.recv().await {
            match chunk_result {
                Ok(StreamChunk::Text { content }) => {
                    if content.is_empty() {
                        continue;
                    }
                    text.push_str(&content);
                    forwarded = true;
                    self.emit(AgentEvent::MessageDelta { content }).await;
                }
                Ok(StreamChunk::Thinking { content }) => {
                    if content.is_empty() {
                        continue;
                    }
                    forwarded = true;
                    self.emit(AgentEvent::ThinkingDelta { content }).await;
                }
                Ok(StreamChunk::ToolCall { call }) => tool_calls.push(call),
                Ok(StreamChunk::Usage { usage }) => progress.usage.add(usage),
                Err(error) => return Err(RoundFailure { error, forwarded }),
            }
        }

        Ok(RoundOutput { text, tool_calls })
    }

    /// Execute one call and return what the model gets to see.
    async fn execute_tool(&self, call: ToolCallRequest) -> String {
        let timeout = Duration::from_millis(self.config.tool_timeout_ms);
        debug!(tool = %call.tool_name, call_id = %call.call_id, "Executing tool");
        self.emit(AgentEvent::ToolCall { call: call.clone() }).await;

        let outcome = match tokio::time::timeout(timeout, self.tool_executor.execute(&call, timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.tool_name.clone(),
                timeout_ms: self.config.tool_timeout_ms,
            }),
        };

        match outcome {
            Ok(mut result) => {
                if result.call_id.is_empty() {
                    result.call_id = call.call_id.clone();
                }
                self.publish_tool_executed(&call.tool_name, result.success, result.duration_ms);
                let output = result.as_model_output();
                self.emit(AgentEvent::ToolResult { result }).await;
                output
            }
            Err(error) => {
                warn!(tool = %call.tool_name, call_id = %call.call_id, error = %error, "Tool call failed");
                self.publish_tool_executed(&call.tool_name, false, 0);
                self.emit(AgentEvent::Error {
                    error: ErrorInfo::from(&error),
                    terminal: false,
                })
                .await;
                format!("Error: {error}")
            }
        }
    }

    fn publish_tool_executed(&self, tool_name: &str, success: bool, duration_ms: u64) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: tool_name.to_string(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }
    }

    async fn emit(&self, event: AgentEvent) {
        // A dropped consumer is not an error for the loop.
        let _ = self.tx.send(event).await;
    }
}
