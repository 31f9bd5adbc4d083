//! Persona provider — where channel-specific system prompts come from.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait PersonaProvider: Send + Sync {
    /// The base system prompt to use for a message arriving on `channel_id`.
    async fn system_prompt(&self, channel_id: &str) -> Result<String>;
}
