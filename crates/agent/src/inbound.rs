//! Inbound message handling: one user message in, exactly one reply out.
//!
//! ```text
//! InboundMessage
//!   → SessionRouter::resolve_session
//!   → PersonaProvider::system_prompt (+ channel switch note)
//!   → ContextAssembler::assemble
//!   → AgentLoop::run, accumulating message deltas
//!   → Delivery::send (real reply, or a localized fallback)
//!   → SessionRouter::update_activity
//! ```
//!
//! `handle` never fails and never panics outward. Anything that goes wrong
//! before delivery turns into a fallback reply and an [`ErrorObserver`] report.

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use switchyard_config::{AgentLoopConfig, AppConfig, HandlerConfig};
use switchyard_core::channel::{Delivery, InboundMessage, OutboundMessage};
use switchyard_core::error::{ContextError, Error, ErrorInfo, ErrorObserver, SessionError};
use switchyard_core::event::{DomainEvent, EventBus};
use switchyard_core::message::Message;
use switchyard_core::persona::PersonaProvider;
use switchyard_core::provider::{Provider, TokenUsage};
use switchyard_core::session::{ChannelContext, SessionState};
use switchyard_core::tool::ToolExecutor;
use switchyard_session::SessionRouter;
use tracing::{debug, error, info, warn};

use crate::context::ContextAssembler;
use crate::loop_runner::{AgentLoop, AgentRunRequest};
use crate::stream_event::AgentEvent;

/// What happened to one inbound message.
#[derive(Debug, Clone, Serialize)]
pub struct HandleOutcome {
    /// The session the message was attached to, if resolution succeeded
    pub session_id: Option<String>,

    /// The text that was (or was attempted to be) delivered
    pub reply: String,

    /// Whether `reply` is the canned fallback
    pub fallback: bool,

    /// Whether the delivery sink accepted the reply
    pub delivered: bool,

    /// Why the turn fell back, if it did
    pub error: Option<ErrorInfo>,

    pub usage: TokenUsage,
    pub duration_ms: u64,
}

struct TurnOutput {
    reply: String,
    usage: TokenUsage,
}

struct TurnFailure {
    info: ErrorInfo,
    usage: TokenUsage,
}

impl TurnFailure {
    fn new(info: ErrorInfo) -> Self {
        Self {
            info,
            usage: TokenUsage::default(),
        }
    }
}

impl From<Error> for TurnFailure {
    fn from(err: Error) -> Self {
        Self::new(ErrorInfo::from(&err))
    }
}

impl From<SessionError> for TurnFailure {
    fn from(err: SessionError) -> Self {
        Error::from(err).into()
    }
}

impl From<ContextError> for TurnFailure {
    fn from(err: ContextError) -> Self {
        Error::from(err).into()
    }
}

/// Handles inbound messages end to end. Holds no per-message state, so one
/// instance serves any number of concurrent calls.
pub struct InboundHandler {
    router: Arc<SessionRouter>,
    persona: Arc<dyn PersonaProvider>,
    assembler: Arc<ContextAssembler>,
    provider: Arc<dyn Provider>,
    tool_executor: Arc<dyn ToolExecutor>,
    delivery: Arc<dyn Delivery>,
    agent: AgentLoop,
    observer: Option<Arc<dyn ErrorObserver>>,
    event_bus: Option<Arc<EventBus>>,
    loop_config: AgentLoopConfig,
    handler_config: HandlerConfig,
}

impl InboundHandler {
    pub fn new(
        router: Arc<SessionRouter>,
        persona: Arc<dyn PersonaProvider>,
        assembler: Arc<ContextAssembler>,
        provider: Arc<dyn Provider>,
        tool_executor: Arc<dyn ToolExecutor>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            router,
            persona,
            assembler,
            provider,
            tool_executor,
            delivery,
            agent: AgentLoop::new(),
            observer: None,
            event_bus: None,
            loop_config: AgentLoopConfig::default(),
            handler_config: HandlerConfig::default(),
        }
    }

    /// Take loop limits and fallback messages from `config`.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.loop_config = config.agent.clone();
        self.handler_config = config.handler.clone();
        self
    }

    pub fn with_error_observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Publish reply, error, and tool events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.agent = self.agent.with_event_bus(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub async fn handle(&self, message: InboundMessage) -> HandleOutcome {
        let started = Instant::now();
        let mut session_id = None;

        let turn = AssertUnwindSafe(self.run_turn(&message, &mut session_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(TurnFailure::new(ErrorInfo::permanent("turn processing panicked"))));

        let (reply, fallback, failure_info, usage) = match turn {
            Ok(TurnOutput { reply, usage }) => (reply, false, None, usage),
            Err(TurnFailure { info, usage }) => {
                error!(
                    user_id = %message.user_id,
                    channel = %message.channel_id,
                    code = %info.code,
                    error = %info.message,
                    "Turn failed, sending fallback reply"
                );
                self.report(&info, "inbound turn").await;
                let text = self.handler_config.fallback_for(message.locale.as_deref()).to_string();
                (text, true, Some(info), usage)
            }
        };

        let delivered = self.deliver(&message, &reply, session_id.as_deref(), fallback).await;

        if let Some(id) = &session_id {
            match AssertUnwindSafe(self.router.update_activity(id)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(session_id = %id, error = %e, "Failed to record session activity"),
                Err(_) => warn!(session_id = %id, "Session store panicked while recording activity"),
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            channel = %message.channel_id,
            fallback,
            delivered,
            duration_ms,
            "Inbound message handled"
        );

        HandleOutcome {
            session_id,
            reply,
            fallback,
            delivered,
            error: failure_info,
            usage,
            duration_ms,
        }
    }

    async fn run_turn(
        &self,
        message: &InboundMessage,
        session_id: &mut Option<String>,
    ) -> Result<TurnOutput, TurnFailure> {
        let resolved = self
            .router
            .resolve_session(&message.user_id, &message.channel_id)
            .await?;
        let id = resolved.session.session_id.clone();
        *session_id = Some(id.clone());

        let channel = self.router.channel_context(&resolved);
        let mut system_prompt = self.persona.system_prompt(&message.channel_id).await?;
        if let Some(note) = channel_switch_note(&channel) {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&note);
        }

        let context = self
            .assembler
            .assemble(
                &system_prompt,
                &message.user_id,
                &message.content,
                message.entity_id.as_deref(),
            )
            .await?;
        debug!(
            session_id = %id,
            sections = context.sections.len(),
            total_tokens = context.total_tokens,
            "Context assembled"
        );

        let mut state = SessionState::Active;
        self.advance(&id, &mut state, SessionState::Thinking).await;

        let result = self.run_agent(message, &id, &mut state, context.render()).await;

        if state != SessionState::Active {
            self.advance(&id, &mut state, SessionState::Active).await;
        }
        result
    }

    async fn run_agent(
        &self,
        message: &InboundMessage,
        session_id: &str,
        state: &mut SessionState,
        rendered_context: String,
    ) -> Result<TurnOutput, TurnFailure> {
        let request = AgentRunRequest {
            messages: vec![Message::system(rendered_context), Message::user(message.content.clone())],
            tools: self.tool_executor.definitions(),
            provider: self.provider.clone(),
            tool_executor: self.tool_executor.clone(),
            config: self.loop_config.clone(),
        };
        let mut run = self
            .agent
            .run(request)
            .map_err(|e| TurnFailure::new(ErrorInfo::permanent(e.to_string())))?;

        let mut reply = String::new();
        let mut terminal = None;
        let mut done = None;

        while let Some(event) = run.recv().await {
            match event {
                AgentEvent::MessageDelta { content } => reply.push_str(&content),
                AgentEvent::ThinkingDelta { .. } => {}
                AgentEvent::ToolCall { .. } => self.advance(session_id, state, SessionState::ToolExecuting).await,
                AgentEvent::ToolResult { .. } => self.advance(session_id, state, SessionState::Thinking).await,
                AgentEvent::Error { error, terminal: false } => {
                    debug!(session_id, code = %error.code, error = %error.message, "Non-terminal agent error");
                    self.advance(session_id, state, SessionState::Thinking).await;
                }
                AgentEvent::Error { error, terminal: true } => terminal = Some(error),
                AgentEvent::Done { usage, .. } => done = Some(usage),
            }
        }

        let usage = done.unwrap_or_default();
        if let Some(info) = terminal {
            return Err(TurnFailure { info, usage });
        }
        if done.is_none() {
            return Err(TurnFailure::new(ErrorInfo::permanent(
                "agent loop ended without completing",
            )));
        }
        if reply.trim().is_empty() {
            return Err(TurnFailure {
                info: ErrorInfo::permanent("agent produced an empty reply"),
                usage,
            });
        }
        Ok(TurnOutput { reply, usage })
    }

    /// Best-effort lifecycle move; a refused transition never fails the turn.
    async fn advance(&self, session_id: &str, state: &mut SessionState, to: SessionState) {
        if *state == to {
            return;
        }
        match self.router.transition_state(session_id, to).await {
            Ok(session) => *state = session.state,
            Err(e) => warn!(session_id, from = %state, %to, error = %e, "Session transition skipped"),
        }
    }

    /// Send exactly once. Failures and panics are reported, never retried.
    async fn deliver(&self, message: &InboundMessage, reply: &str, session_id: Option<&str>, fallback: bool) -> bool {
        let outbound = OutboundMessage::markdown(reply, message.message_id.clone());
        let target = message.reply_target();
        let sent = AssertUnwindSafe(self.delivery.send(&target, outbound))
            .catch_unwind()
            .await;
        let Ok(sent) = sent else {
            warn!(channel = %message.channel_id, "Reply delivery panicked");
            self.report(&ErrorInfo::permanent("reply delivery panicked"), "delivery").await;
            return false;
        };
        match sent {
            Ok(_) => {
                self.publish(DomainEvent::ReplyDelivered {
                    session_id: session_id.map(str::to_string),
                    channel: message.channel_id.clone(),
                    fallback,
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                warn!(channel = %message.channel_id, error = %e, "Reply delivery failed");
                let info = ErrorInfo::from(&Error::from(e));
                self.report(&info, "delivery").await;
                false
            }
        }
    }

    /// Publish and hand to the observer. Observer failures and panics stay here.
    async fn report(&self, info: &ErrorInfo, context: &str) {
        self.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            code: info.code,
            error_message: info.message.clone(),
            timestamp: Utc::now(),
        });

        let Some(observer) = &self.observer else {
            return;
        };
        match AssertUnwindSafe(observer.on_error(info)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Error observer failed"),
            Err(_) => warn!("Error observer panicked"),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn channel_switch_note(channel: &ChannelContext) -> Option<String> {
    if !channel.channel_switched {
        return None;
    }
    let previous = channel.previous_channel.as_deref()?;
    Some(format!(
        "The user was just talking to you on {previous} and has now switched to {}. \
         Continue the same conversation without re-introducing yourself.",
        channel.current_channel
    ))
}
