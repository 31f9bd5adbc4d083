//! Memory-tier providers for Switchyard.
//!
//! Production deployments plug their own stores in behind
//! [`ContextDataProvider`](switchyard_core::memory::ContextDataProvider);
//! these two cover tests, demos, and memory-less agents.

pub mod noop;
pub mod in_memory;

pub use noop::NoopContextProvider;
pub use in_memory::InMemoryContextProvider;
