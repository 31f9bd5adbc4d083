//! Session router — resolves a user's session across channels and drives its
//! lifecycle through the state machine.
//!
//! The router holds no session state of its own. Every read and write goes
//! through the [`SessionStore`], and every state change is validated against
//! [`crate::state_machine`] before it is committed.

use chrono::Utc;
use std::sync::Arc;
use switchyard_core::error::SessionError;
use switchyard_core::event::{DomainEvent, EventBus};
use switchyard_core::session::{
    ChannelContext, ResolvedSession, Session, SessionState, SessionStats, SessionStore, SessionSummary,
};

use crate::state_machine::validate_transition;

pub struct SessionRouter {
    store: Arc<dyn SessionStore>,
    events: Option<Arc<EventBus>>,
}

impl SessionRouter {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store, events: None }
    }

    /// Publish lifecycle and channel-switch events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Resolve (or create) the session for `user_id` arriving on `channel_id`
    /// and make sure it ends up `active`.
    pub async fn resolve_session(&self, user_id: &str, channel_id: &str) -> Result<ResolvedSession, SessionError> {
        let mut resolved = self.store.resolve(user_id, channel_id).await?;

        if resolved.channel_switched {
            self.publish(DomainEvent::ChannelSwitched {
                session_id: resolved.session.session_id.clone(),
                user_id: user_id.to_string(),
                from_channel: resolved.previous_channel_id.clone(),
                to_channel: channel_id.to_string(),
                timestamp: Utc::now(),
            });
        }

        // Already active: nothing to commit.
        if resolved.session.state != SessionState::Active {
            let (id, from) = (resolved.session.session_id.clone(), resolved.session.state);
            resolved.session = self.commit(&id, from, SessionState::Active).await?;
        }

        tracing::debug!(
            session_id = %resolved.session.session_id,
            user_id,
            channel = channel_id,
            is_new = resolved.is_new,
            channel_switched = resolved.channel_switched,
            "Session resolved"
        );
        Ok(resolved)
    }

    /// Where the session is now and where it came from. No store access.
    pub fn channel_context(&self, resolved: &ResolvedSession) -> ChannelContext {
        ChannelContext {
            current_channel: resolved.session.active_channel_id.clone(),
            previous_channel: resolved.previous_channel_id.clone(),
            channel_switched: resolved.channel_switched,
            session_channels: resolved.session.channel_history.clone(),
        }
    }

    /// Move a session to `to`, validated against its current stored state.
    pub async fn transition_state(&self, session_id: &str, to: SessionState) -> Result<Session, SessionError> {
        let current = self.store.get(session_id).await?;
        self.commit(session_id, current.state, to).await
    }

    /// Close a session: `current -> summarizing -> ending -> ended`.
    ///
    /// Fails without touching the store when the session is mid-turn
    /// (`thinking` / `tool_executing`); callers must return it to `active` first.
    pub async fn end_session(&self, session_id: &str) -> Result<SessionSummary, SessionError> {
        let current = self.store.get(session_id).await?;

        self.commit(session_id, current.state, SessionState::Summarizing).await?;
        let summary = self.store.end(session_id).await?;
        self.commit(session_id, SessionState::Summarizing, SessionState::Ending).await?;
        self.commit(session_id, SessionState::Ending, SessionState::Ended).await?;

        tracing::info!(
            session_id,
            turns = summary.turn_count,
            channels = summary.channels.len(),
            "Session ended"
        );
        Ok(summary)
    }

    pub async fn update_activity(&self, session_id: &str) -> Result<(), SessionError> {
        self.store.update_activity(session_id).await
    }

    pub async fn get_active_session(&self, user_id: &str) -> Result<Option<Session>, SessionError> {
        self.store.get_active(user_id).await
    }

    pub async fn get_session_stats(&self, session_id: &str) -> Result<SessionStats, SessionError> {
        self.store.get_stats(session_id).await
    }

    async fn commit(&self, session_id: &str, from: SessionState, to: SessionState) -> Result<Session, SessionError> {
        validate_transition(from, to)?;
        let session = self.store.update_state(session_id, to).await?;
        tracing::debug!(session_id, %from, %to, "Session state changed");
        self.publish(DomainEvent::SessionStateChanged {
            session_id: session_id.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        });
        Ok(session)
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
