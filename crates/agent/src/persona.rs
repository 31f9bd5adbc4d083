//! Config-backed persona provider.

use async_trait::async_trait;
use std::collections::BTreeMap;
use switchyard_config::PersonaConfig;
use switchyard_core::error::Result;
use switchyard_core::persona::PersonaProvider;

/// Serves a fixed default prompt, overridden per channel.
#[derive(Debug, Clone)]
pub struct StaticPersona {
    default_prompt: String,
    channel_prompts: BTreeMap<String, String>,
}

impl StaticPersona {
    pub fn new(default_prompt: impl Into<String>) -> Self {
        Self {
            default_prompt: default_prompt.into(),
            channel_prompts: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &PersonaConfig) -> Self {
        Self {
            default_prompt: config.default_prompt.clone(),
            channel_prompts: config.channel_prompts.clone(),
        }
    }

    pub fn with_channel_prompt(mut self, channel_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.channel_prompts.insert(channel_id.into(), prompt.into());
        self
    }
}

#[async_trait]
impl PersonaProvider for StaticPersona {
    async fn system_prompt(&self, channel_id: &str) -> Result<String> {
        Ok(self
            .channel_prompts
            .get(channel_id)
            .unwrap_or(&self.default_prompt)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_override_wins() {
        let persona = StaticPersona::new("Be helpful.").with_channel_prompt("sms", "Be brief. Plain text only.");
        assert_eq!(persona.system_prompt("sms").await.unwrap(), "Be brief. Plain text only.");
        assert_eq!(persona.system_prompt("discord").await.unwrap(), "Be helpful.");
    }

    #[tokio::test]
    async fn from_config_uses_defaults() {
        let persona = StaticPersona::from_config(&PersonaConfig::default());
        let prompt = persona.system_prompt("cli").await.unwrap();
        assert!(prompt.contains("helpful assistant"));
    }
}
