//! Offline collaborators for `switchyard chat`.
//!
//! No vendor protocol lives here: the echo provider plays the model so the
//! whole inbound pipeline (sessions, context, loop, tools, delivery) can be
//! exercised from a terminal.

use async_trait::async_trait;
use chrono::Utc;
use switchyard_agent::context::estimate_tokens;
use switchyard_core::channel::{Delivery, DeliveryAck, DeliveryTarget, OutboundMessage};
use switchyard_core::error::{ChannelError, ProviderError, ToolError};
use switchyard_core::message::{Message, Role};
use switchyard_core::provider::{ChatParams, ChunkStream, Provider, StreamChunk, TokenUsage};
use switchyard_core::tool::{Tool, ToolCallRequest, ToolResult};
use tokio::sync::mpsc;

/// Echoes the user back, asking for `current_time` when the user mentions time.
pub struct EchoProvider;

impl EchoProvider {
    fn respond(params: &ChatParams) -> Vec<StreamChunk> {
        let Some(last) = params.messages.last() else {
            return vec![StreamChunk::text("(nothing to answer)")];
        };

        let offers_clock = params.tools.iter().any(|t| t.name == "current_time");
        match last.role {
            Role::Tool => words(&format!("The current time is {}.", last.content)),
            Role::User if offers_clock && last.content.to_lowercase().contains("time") => {
                vec![StreamChunk::tool_call(ToolCallRequest {
                    tool_name: "current_time".into(),
                    args: serde_json::json!({}),
                    call_id: format!("call_{}", params.messages.len()),
                })]
            }
            _ => {
                let switched = params
                    .messages
                    .first()
                    .is_some_and(|m| m.role == Role::System && m.content.contains("has now switched to"));
                let greeting = if switched { "Welcome back! " } else { "" };
                words(&format!("{greeting}You said: {}", last.content))
            }
        }
    }
}

fn words(text: &str) -> Vec<StreamChunk> {
    text.split_inclusive(' ').map(StreamChunk::text).collect()
}

fn usage_for(messages: &[Message], chunks: &[StreamChunk]) -> TokenUsage {
    let output: usize = chunks
        .iter()
        .map(|c| match c {
            StreamChunk::Text { content } => estimate_tokens(content),
            _ => 1,
        })
        .sum();
    TokenUsage {
        input_tokens: messages.iter().map(|m| estimate_tokens(&m.content)).sum::<usize>() as u64,
        output_tokens: output as u64,
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, params: ChatParams) -> Result<ChunkStream, ProviderError> {
        let chunks = Self::respond(&params);
        let usage = usage_for(&params.messages, &chunks);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for chunk in chunks {
                if params.cancel.is_cancelled() || tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::Usage { usage })).await;
        });
        Ok(rx)
    }
}

/// Current UTC time as RFC 3339.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current UTC date and time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(Utc::now().to_rfc3339()))
    }
}

/// Prints replies to stdout, prefixed with the channel they were meant for.
pub struct StdoutDelivery;

#[async_trait]
impl Delivery for StdoutDelivery {
    async fn send(&self, target: &DeliveryTarget, message: OutboundMessage) -> Result<DeliveryAck, ChannelError> {
        println!();
        for line in message.content.lines() {
            println!("  [{}] Assistant > {line}", target.channel_id);
        }
        println!();
        Ok(DeliveryAck::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::provider::ToolDefinition;

    fn params(messages: Vec<Message>, with_clock: bool) -> ChatParams {
        ChatParams {
            messages,
            tools: if with_clock {
                vec![CurrentTimeTool.to_definition()]
            } else {
                Vec::<ToolDefinition>::new()
            },
            stream: true,
            cancel: Default::default(),
        }
    }

    async fn drain(mut rx: ChunkStream) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.push(chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn echoes_plain_messages_word_by_word() {
        let rx = EchoProvider
            .chat(params(vec![Message::system("ctx"), Message::user("hello there")], true))
            .await
            .unwrap();
        let chunks = drain(rx).await;

        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "You said: hello there");
        assert!(matches!(chunks.last(), Some(StreamChunk::Usage { .. })));
    }

    #[tokio::test]
    async fn asks_for_the_clock_when_time_is_mentioned() {
        let rx = EchoProvider
            .chat(params(vec![Message::user("what time is it?")], true))
            .await
            .unwrap();
        let chunks = drain(rx).await;
        assert!(matches!(&chunks[0], StreamChunk::ToolCall { call } if call.tool_name == "current_time"));

        let rx = EchoProvider
            .chat(params(vec![Message::user("what time is it?")], false))
            .await
            .unwrap();
        assert!(matches!(&drain(rx).await[0], StreamChunk::Text { .. }));
    }

    #[tokio::test]
    async fn current_time_tool_returns_rfc3339() {
        let result = CurrentTimeTool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);
        let stamp = result.content.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
