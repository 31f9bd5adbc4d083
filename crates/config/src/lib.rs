//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentLoopConfig,

    /// Context assembly budgets and fetch limits
    #[serde(default)]
    pub context: ContextConfig,

    /// Session reuse policy
    #[serde(default)]
    pub session: SessionConfig,

    /// System prompts per channel
    #[serde(default)]
    pub persona: PersonaConfig,

    /// Inbound handler behaviour (fallback replies)
    #[serde(default)]
    pub handler: HandlerConfig,
}

/// Limits for one agent loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum model rounds (and tool executions) per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Per tool call deadline
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Hard deadline for the whole invocation
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub streaming_enabled: bool,

    /// First backoff delay after a retryable provider error; doubles per retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,

    /// Capacity of the event channel between the loop task and its consumer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_iterations() -> usize {
    10
}
fn default_tool_timeout_ms() -> u64 {
    30_000
}
fn default_total_timeout_ms() -> u64 {
    120_000
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_max_retry_backoff_ms() -> u64 {
    4_000
}
fn default_event_buffer() -> usize {
    128
}
fn default_true() -> bool {
    true
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_ms: default_tool_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
            streaming_enabled: true,
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub budget: ContextBudget,

    #[serde(default)]
    pub sources: SourceLimits,
}

/// Token cap per context source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    #[serde(default = "default_system_prompt_budget")]
    pub system_prompt: usize,
    #[serde(default = "default_working_memory_budget")]
    pub working_memory: usize,
    #[serde(default = "default_stream_buffer_budget")]
    pub stream_buffer: usize,
    #[serde(default = "default_semantic_search_budget")]
    pub semantic_search: usize,
    #[serde(default = "default_graph_traversal_budget")]
    pub graph_traversal: usize,
    #[serde(default = "default_session_archive_budget")]
    pub session_archive: usize,
    #[serde(default = "default_meta_memory_budget")]
    pub meta_memory: usize,
    #[serde(default = "default_tool_definitions_budget")]
    pub tool_definitions: usize,
}

fn default_system_prompt_budget() -> usize {
    2000
}
fn default_working_memory_budget() -> usize {
    1500
}
fn default_stream_buffer_budget() -> usize {
    500
}
fn default_semantic_search_budget() -> usize {
    1000
}
fn default_graph_traversal_budget() -> usize {
    500
}
fn default_session_archive_budget() -> usize {
    500
}
fn default_meta_memory_budget() -> usize {
    300
}
fn default_tool_definitions_budget() -> usize {
    700
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt_budget(),
            working_memory: default_working_memory_budget(),
            stream_buffer: default_stream_buffer_budget(),
            semantic_search: default_semantic_search_budget(),
            graph_traversal: default_graph_traversal_budget(),
            session_archive: default_session_archive_budget(),
            meta_memory: default_meta_memory_budget(),
            tool_definitions: default_tool_definitions_budget(),
        }
    }
}

impl ContextBudget {
    /// Sum of every cap, i.e. the largest prompt the assembler can produce.
    pub fn total(&self) -> usize {
        self.system_prompt
            + self.working_memory
            + self.stream_buffer
            + self.semantic_search
            + self.graph_traversal
            + self.session_archive
            + self.meta_memory
            + self.tool_definitions
    }
}

/// How much each memory tier is asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLimits {
    #[serde(default = "default_working_memory_limit")]
    pub working_memory_limit: usize,
    #[serde(default = "default_semantic_limit")]
    pub semantic_limit: usize,
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
    #[serde(default = "default_archive_days")]
    pub archive_days: u32,
}

fn default_working_memory_limit() -> usize {
    20
}
fn default_semantic_limit() -> usize {
    5
}
fn default_graph_depth() -> usize {
    2
}
fn default_archive_days() -> u32 {
    7
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            working_memory_limit: default_working_memory_limit(),
            semantic_limit: default_semantic_limit(),
            graph_depth: default_graph_depth(),
            archive_days: default_archive_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A session idle for longer than this is not reused
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,
}

fn default_stale_after_minutes() -> i64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: default_stale_after_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_prompt")]
    pub default_prompt: String,

    /// Overrides keyed by channel id
    #[serde(default)]
    pub channel_prompts: BTreeMap<String, String>,
}

fn default_persona_prompt() -> String {
    "You are a helpful assistant. Answer concisely and use tools when they help.".into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            default_prompt: default_persona_prompt(),
            channel_prompts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Generic apology sent when a turn fails, keyed by locale
    #[serde(default = "default_fallback_messages")]
    pub fallback_messages: BTreeMap<String, String>,
}

fn default_locale() -> String {
    "en".into()
}

fn default_fallback_messages() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("en".to_string(), "Sorry, something went wrong on my side. Please try again in a moment.".to_string()),
        ("es".to_string(), "Lo siento, algo salió mal. Por favor, inténtalo de nuevo en un momento.".to_string()),
        ("fr".to_string(), "Désolé, un problème est survenu. Veuillez réessayer dans un instant.".to_string()),
        ("de".to_string(), "Entschuldigung, etwas ist schiefgelaufen. Bitte versuche es gleich noch einmal.".to_string()),
    ])
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            fallback_messages: default_fallback_messages(),
        }
    }
}

impl HandlerConfig {
    /// Fallback text for `locale`, trying the language prefix ("pt-BR" -> "pt")
    /// and then the default locale.
    pub fn fallback_for(&self, locale: Option<&str>) -> &str {
        const LAST_RESORT: &str = "Sorry, something went wrong. Please try again.";

        let lookup = |key: &str| self.fallback_messages.get(key).filter(|m| !m.trim().is_empty());
        locale
            .and_then(|l| lookup(l).or_else(|| l.split(['-', '_']).next().and_then(lookup)))
            .or_else(|| lookup(&self.default_locale))
            .map(String::as_str)
            .unwrap_or(LAST_RESORT)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `SWITCHYARD_MAX_ITERATIONS`
    /// - `SWITCHYARD_TOOL_TIMEOUT_MS`
    /// - `SWITCHYARD_TOTAL_TIMEOUT_MS`
    /// - `SWITCHYARD_LOCALE`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = parse_override(&lookup, "SWITCHYARD_MAX_ITERATIONS")? {
            self.agent.max_iterations = v;
        }
        if let Some(v) = parse_override(&lookup, "SWITCHYARD_TOOL_TIMEOUT_MS")? {
            self.agent.tool_timeout_ms = v;
        }
        if let Some(v) = parse_override(&lookup, "SWITCHYARD_TOTAL_TIMEOUT_MS")? {
            self.agent.total_timeout_ms = v;
        }
        if let Some(locale) = lookup("SWITCHYARD_LOCALE") {
            self.handler.default_locale = locale;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError("agent.max_iterations must be > 0".into()));
        }
        if self.agent.tool_timeout_ms == 0 || self.agent.total_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("agent timeouts must be > 0".into()));
        }
        if self.agent.event_buffer == 0 {
            return Err(ConfigError::ValidationError("agent.event_buffer must be > 0".into()));
        }
        if self.session.stale_after_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "session.stale_after_minutes must be > 0".into(),
            ));
        }
        if !self.handler.fallback_messages.contains_key(&self.handler.default_locale) {
            return Err(ConfigError::ValidationError(format!(
                "handler.fallback_messages has no entry for default locale '{}'",
                self.handler.default_locale
            )));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

fn parse_override<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::ValidationError(format!("{key} has invalid value '{raw}'"))),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
