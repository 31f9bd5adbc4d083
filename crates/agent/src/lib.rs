//! The request path of Switchyard.
//!
//! An inbound message flows through three stages:
//!
//! 1. **Assemble context**: the persona prompt plus every memory tier, each
//!    capped to its token budget ([`context`])
//! 2. **Run the agent loop**: stream model rounds, execute requested tools,
//!    feed results back, until a final answer ([`loop_runner`])
//! 3. **Deliver**: exactly one reply per message, falling back to a canned
//!    apology when anything fails ([`inbound`])

pub mod context;
pub mod inbound;
pub mod loop_runner;
pub mod persona;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use context::{AssembledContext, ContextAssembler, ContextSection, HeuristicTokenCounter};
pub use inbound::{HandleOutcome, InboundHandler};
pub use loop_runner::{AgentLoop, AgentLoopError, AgentRun, AgentRunRequest};
pub use persona::StaticPersona;
pub use stream_event::AgentEvent;
