//! Session lifecycle rules.
//!
//! The legal moves are a static adjacency table consulted at call time, so the
//! whole lifecycle can be audited in one place:
//!
//! ```text
//! initializing -> active
//! active -> thinking -> tool_executing -> thinking
//!              \-> active      \-> active
//! active -> summarizing -> ending -> ended
//! ```

use switchyard_core::error::SessionError;
use switchyard_core::session::SessionState;

use SessionState::*;

/// Every legal `(from, to)` edge. Anything else is rejected.
pub const LEGAL_TRANSITIONS: &[(SessionState, SessionState)] = &[
    (Initializing, Active),
    (Active, Thinking),
    (Thinking, ToolExecuting),
    (ToolExecuting, Thinking),
    (Thinking, Active),
    (ToolExecuting, Active),
    (Active, Summarizing),
    (Summarizing, Ending),
    (Ending, Ended),
];

pub fn is_legal(from: SessionState, to: SessionState) -> bool {
    LEGAL_TRANSITIONS.contains(&(from, to))
}

/// Check one edge, returning the attempted pair on failure.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    if is_legal(from, to) {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition { from, to })
    }
}

/// States reachable from `from` in one step.
pub fn next_states(from: SessionState) -> Vec<SessionState> {
    LEGAL_TRANSITIONS
        .iter()
        .filter(|(f, _)| *f == from)
        .map(|(_, t)| *t)
        .collect()
}

pub fn is_terminal(state: SessionState) -> bool {
    next_states(state).is_empty()
}
