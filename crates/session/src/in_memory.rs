//! In-memory session store — useful for testing and single-process deployments.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_config::SessionConfig;
use switchyard_core::error::SessionError;
use switchyard_core::session::{ResolvedSession, Session, SessionState, SessionStats, SessionStore, SessionSummary};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Stores sessions in a map keyed by session id.
///
/// A user's most recent open session is reused while its last activity is
/// within the staleness window; otherwise `resolve` starts a new one.
///
/// Nothing is ever evicted. Stale and ended sessions stay in the
/// map so their stats and summaries remain readable, which means memory
/// grows with the number of sessions ever created. Use a persistent
/// [`SessionStore`] with its own retention for long-running deployments.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    stale_after: Duration,
}

impl InMemorySessionStore {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            stale_after,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(Duration::minutes(config.stale_after_minutes))
    }

    /// Number of sessions held, open or not.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn is_reusable(&self, session: &Session, user_id: &str) -> bool {
        let open = matches!(
            session.state,
            SessionState::Initializing | SessionState::Active | SessionState::Thinking | SessionState::ToolExecuting
        );
        session.user_id == user_id && open && Utc::now() - session.last_activity_at <= self.stale_after
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn resolve(&self, user_id: &str, channel_id: &str) -> Result<ResolvedSession, SessionError> {
        let mut sessions = self.sessions.write().await;

        let reusable = sessions
            .values()
            .filter(|s| self.is_reusable(s, user_id))
            .max_by_key(|s| s.last_activity_at)
            .map(|s| s.session_id.clone());

        if let Some(id) = reusable
            && let Some(session) = sessions.get_mut(&id)
        {
            let previous = session.active_channel_id.clone();
            let switched = previous != channel_id;
            if switched {
                if session.channel_history.last().map(String::as_str) != Some(channel_id) {
                    session.channel_history.push(channel_id.to_string());
                }
                session.active_channel_id = channel_id.to_string();
                tracing::info!(
                    session_id = %session.session_id,
                    user_id,
                    from = %previous,
                    to = channel_id,
                    "Session switched channel"
                );
            }
            return Ok(ResolvedSession {
                session: session.clone(),
                is_new: false,
                channel_switched: switched,
                previous_channel_id: switched.then_some(previous),
            });
        }

        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            active_channel_id: channel_id.to_string(),
            channel_history: vec![channel_id.to_string()],
            started_at: now,
            last_activity_at: now,
            turn_count: 0,
            state: SessionState::Initializing,
        };
        tracing::info!(session_id = %session.session_id, user_id, channel = channel_id, "Session created");
        sessions.insert(session.session_id.clone(), session.clone());

        Ok(ResolvedSession {
            session,
            is_new: true,
            channel_switched: false,
            previous_channel_id: None,
        })
    }

    async fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn update_activity(&self, session_id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.last_activity_at = Utc::now();
        session.turn_count += 1;
        Ok(())
    }

    async fn get_active(&self, user_id: &str) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| self.is_reusable(s, user_id))
            .max_by_key(|s| s.last_activity_at)
            .cloned())
    }

    async fn get_stats(&self, session_id: &str) -> Result<SessionStats, SessionError> {
        let session = self.get(session_id).await?;
        Ok(SessionStats {
            duration_secs: (session.last_activity_at - session.started_at).num_seconds(),
            session_id: session.session_id,
            state: session.state,
            turn_count: session.turn_count,
            channel_count: session.channel_history.len(),
            started_at: session.started_at,
            last_activity_at: session.last_activity_at,
        })
    }

    async fn end(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        let session = self.get(session_id).await?;
        Ok(SessionSummary {
            session_id: session.session_id,
            user_id: session.user_id,
            turn_count: session.turn_count,
            channels: session.channel_history,
            started_at: session.started_at,
            ended_at: Utc::now(),
        })
    }

    async fn update_state(&self, session_id: &str, state: SessionState) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.state = state;
        Ok(session.clone())
    }
}
