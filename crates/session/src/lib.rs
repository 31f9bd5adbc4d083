//! Session lifecycle and cross-channel routing for Switchyard.
//!
//! - [`state_machine`]: the legal lifecycle edges
//! - [`router`]: resolve/switch/end sessions through a [`SessionStore`]
//! - [`in_memory`]: a map-backed store with a staleness window
//!
//! [`SessionStore`]: switchyard_core::session::SessionStore

pub mod state_machine;
pub mod router;
pub mod in_memory;

pub use state_machine::{LEGAL_TRANSITIONS, is_legal, validate_transition};
pub use router::SessionRouter;
pub use in_memory::InMemorySessionStore;
