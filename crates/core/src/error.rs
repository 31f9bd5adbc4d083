//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every error can be
//! classified into an [`ErrorInfo`] for in-band reporting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::ContextSource;
use crate::session::SessionState;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Context assembly ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Anything the provider could not classify. Always treated as permanent.
    #[error("Unclassified provider failure: {0}")]
    Unclassified(String),
}

impl ProviderError {
    /// Whether re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::StreamInterrupted(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::AuthenticationFailed(_)
            | Self::ModelNotFound(_)
            | Self::NotConfigured(_)
            | Self::Unclassified(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed {
        tool_name: String,
        reason: String,
        retryable: bool,
    },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExecutionFailed { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            Self::NotFound(_) | Self::PermissionDenied { .. } | Self::InvalidArguments(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Raised synchronously by the state machine for any edge outside the legal set.
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session store failure: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Failed to fetch {tier}: {error}")]
    Fetch { tier: ContextSource, error: MemoryError },

    #[error("Token counting failed: {0}")]
    TokenCount(String),
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

// --- Classification ---

/// The coarse failure class reported alongside every in-band error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Provider,
    Tool,
    Timeout,
    Permanent,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Provider => "PROVIDER",
            Self::Tool => "TOOL",
            Self::Timeout => "TIMEOUT",
            Self::Permanent => "PERMANENT",
        };
        f.write_str(s)
    }
}

/// A classified failure: what went wrong, and whether trying again could help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    pub is_retryable: bool,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>, is_retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            is_retryable,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message, true)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Permanent, message, false)
    }
}

impl From<&ProviderError> for ErrorInfo {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::Unclassified(_) => Self::permanent(err.to_string()),
            _ => Self::new(ErrorCode::Provider, err.to_string(), err.is_retryable()),
        }
    }
}

impl From<&ToolError> for ErrorInfo {
    fn from(err: &ToolError) -> Self {
        match err {
            ToolError::Timeout { .. } => Self::timeout(err.to_string()),
            _ => Self::new(ErrorCode::Tool, err.to_string(), err.is_retryable()),
        }
    }
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        match err {
            Error::Provider(e) => e.into(),
            Error::Tool(e) => e.into(),
            Error::Timeout(_) => Self::timeout(err.to_string()),
            _ => Self::permanent(err.to_string()),
        }
    }
}

/// Optional telemetry sink for classified failures.
///
/// Implementations may fail or even panic; callers must never let that
/// escape into the user-facing path.
#[async_trait]
pub trait ErrorObserver: Send + Sync {
    async fn on_error(&self, info: &ErrorInfo) -> Result<()>;
}
