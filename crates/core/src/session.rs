//! Session domain types and the session store contract.
//!
//! A session is one user's logical conversation, which may hop between
//! channels. The store owns persistence and the reuse-vs-new staleness
//! policy; lifecycle rules live in the session crate's state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Lifecycle state of a session. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    Active,
    Thinking,
    ToolExecuting,
    Summarizing,
    Ending,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Thinking => "thinking",
            Self::ToolExecuting => "tool_executing",
            Self::Summarizing => "summarizing",
            Self::Ending => "ending",
            Self::Ended => "ended",
        }
    }

    pub const ALL: [SessionState; 7] = [
        Self::Initializing,
        Self::Active,
        Self::Thinking,
        Self::ToolExecuting,
        Self::Summarizing,
        Self::Ending,
        Self::Ended,
    ];
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's logical session across channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub active_channel_id: String,

    /// Channels visited, in order. Append-only, never two equal neighbours.
    pub channel_history: Vec<String>,

    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turn_count: u64,
    pub state: SessionState,
}

/// Snapshot produced by one resolve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub session: Session,
    pub is_new: bool,
    pub channel_switched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_channel_id: Option<String>,
}

/// Read-only view of where a session currently is and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelContext {
    pub current_channel: String,
    pub previous_channel: Option<String>,
    pub channel_switched: bool,
    pub session_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub state: SessionState,
    pub turn_count: u64,
    pub channel_count: usize,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub duration_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub turn_count: u64,
    pub channels: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Persistence for sessions.
///
/// Implementations handle their own concurrency control. `resolve` decides
/// whether to reuse or create a session; it never validates transitions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve(&self, user_id: &str, channel_id: &str) -> Result<ResolvedSession, SessionError>;

    async fn get(&self, session_id: &str) -> Result<Session, SessionError>;

    async fn update_activity(&self, session_id: &str) -> Result<(), SessionError>;

    async fn get_active(&self, user_id: &str) -> Result<Option<Session>, SessionError>;

    async fn get_stats(&self, session_id: &str) -> Result<SessionStats, SessionError>;

    async fn end(&self, session_id: &str) -> Result<SessionSummary, SessionError>;

    async fn update_state(&self, session_id: &str, state: SessionState) -> Result<Session, SessionError>;
}
