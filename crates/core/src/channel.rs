//! Channel-facing message types and the delivery contract.
//!
//! Channel adapters (chat platforms, CLI, web socket gateway) live outside
//! this workspace. They hand the orchestrator an [`InboundMessage`] and
//! provide a [`Delivery`] sink for the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A message received from a user on some channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable user identifier across channels
    pub user_id: String,

    /// The channel the message arrived on (e.g., "discord", "cli")
    pub channel_id: String,

    /// The chat/group/DM identifier within the channel
    pub chat_id: String,

    /// The text content
    pub content: String,

    /// Platform message ID, used for threading the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Preferred locale for canned replies (e.g., "en", "es")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Focus entity for knowledge-graph context, if the channel knows one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        let channel_id = channel_id.into();
        Self {
            user_id: user_id.into(),
            chat_id: channel_id.clone(),
            channel_id,
            content: content.into(),
            message_id: None,
            locale: None,
            entity_id: None,
        }
    }

    /// Where the reply to this message should go.
    pub fn reply_target(&self) -> DeliveryTarget {
        DeliveryTarget {
            channel_id: self.channel_id.clone(),
            chat_id: self.chat_id.clone(),
        }
    }
}

/// Destination for an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub channel_id: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Markdown,
    Plain,
}

/// An attachment on an outbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// URL or file path
    pub url: String,

    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    pub format: MessageFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<Attachment>,
}

impl OutboundMessage {
    pub fn markdown(content: impl Into<String>, reply_to: Option<String>) -> Self {
        Self {
            content: content.into(),
            format: MessageFormat::Markdown,
            reply_to,
            media: Vec::new(),
        }
    }
}

/// Acknowledgement from the delivery sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Sends replies back out through a channel.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(&self, target: &DeliveryTarget, message: OutboundMessage) -> Result<DeliveryAck, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_defaults_chat_to_channel() {
        let msg = InboundMessage::new("mark", "discord", "hi");
        let target = msg.reply_target();
        assert_eq!(target.channel_id, "discord");
        assert_eq!(target.chat_id, "discord");
    }

    #[test]
    fn outbound_serializes_markdown_format() {
        let msg = OutboundMessage::markdown("**hello**", Some("m-1".into()));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"format\":\"markdown\""));
        assert!(json.contains("m-1"));
        assert!(!json.contains("media"));
    }
}
