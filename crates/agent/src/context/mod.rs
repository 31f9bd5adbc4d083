//! Budgeted context assembly.
//!
//! Pulls from the memory tiers behind
//! [`ContextDataProvider`](switchyard_core::memory::ContextDataProvider),
//! formats each tier into one section, and caps every section and the system
//! prompt to its token budget.

pub mod assembler;
pub mod token;

pub use assembler::{AssembledContext, ContextAssembler, ContextSection};
pub use token::{HeuristicTokenCounter, estimate_tokens, truncate_to_budget};
