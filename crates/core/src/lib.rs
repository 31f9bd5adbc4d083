//! # Switchyard Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Switchyard agent orchestrator. This crate has **no runtime wiring**: it
//! defines the model that the session, memory, and agent crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (session store, memory tiers, token counter,
//! model provider, tool executor, persona, delivery) is a trait here.
//! Implementations live elsewhere. This enables:
//! - Swapping storage and vendors without touching orchestration
//! - Easy testing with scripted mock collaborators
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod memory;
pub mod session;
pub mod persona;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{
    ChannelError, ContextError, Error, ErrorCode, ErrorInfo, ErrorObserver, MemoryError, ProviderError, Result,
    SessionError, ToolError,
};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{ChatParams, ChunkStream, Provider, StreamChunk, TokenUsage, ToolDefinition};
pub use channel::{Delivery, DeliveryAck, DeliveryTarget, InboundMessage, MessageFormat, OutboundMessage};
pub use tool::{Tool, ToolCallRequest, ToolExecutor, ToolRegistry, ToolResult};
pub use memory::{ContextDataProvider, ContextSource, TokenCounter};
pub use session::{
    ChannelContext, ResolvedSession, Session, SessionState, SessionStats, SessionStore, SessionSummary,
};
pub use persona::PersonaProvider;
pub use event::{DomainEvent, EventBus};
