//! Memory tiers and the context data provider contract.
//!
//! The context assembler reads from several memory tiers, each owned by an
//! external store:
//! - M0 stream buffer (raw recent events)
//! - M1 working memory (recent turns)
//! - M2 session archive (summaries of past sessions)
//! - M3 semantic search (similarity-ranked recall)
//! - M4 knowledge graph (entities around a focus entity)
//! - M5 meta memory (durable facts about the user)
//!
//! Token counting is a separate collaborator because the authoritative count
//! may require a tokenizer round-trip while the estimate must stay cheap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::provider::ToolDefinition;

/// Where a piece of assembled context came from.
///
/// Declaration order is the section order of an assembled prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextSource {
    SystemPrompt,
    WorkingMemory,
    StreamBuffer,
    SemanticSearch,
    GraphTraversal,
    SessionArchive,
    MetaMemory,
    ToolDefinitions,
}

impl ContextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemPrompt => "systemPrompt",
            Self::WorkingMemory => "workingMemory",
            Self::StreamBuffer => "streamBuffer",
            Self::SemanticSearch => "semanticSearch",
            Self::GraphTraversal => "graphTraversal",
            Self::SessionArchive => "sessionArchive",
            Self::MetaMemory => "metaMemory",
            Self::ToolDefinitions => "toolDefinitions",
        }
    }

    /// Human-readable section title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::SystemPrompt => "System Prompt",
            Self::WorkingMemory => "Recent Conversation",
            Self::StreamBuffer => "Recent Activity",
            Self::SemanticSearch => "Relevant Memories",
            Self::GraphTraversal => "Related Entities",
            Self::SessionArchive => "Past Sessions",
            Self::MetaMemory => "About the User",
            Self::ToolDefinitions => "Available Tools",
        }
    }
}

impl std::fmt::Display for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recent conversational turn (M1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryTurn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A raw recent event (M0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A similarity-ranked recall hit (M3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMatch {
    pub content: String,
    pub similarity: f32,
}

/// An entity reached by graph traversal (M4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntity {
    pub name: String,
    pub entity_type: String,
}

/// A summary of a past session (M2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub session_id: String,
    pub summary: String,
    pub ended_at: DateTime<Utc>,
}

/// A durable fact about the user (M5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaMemoryEntry {
    pub content: String,
}

/// Read-only access to every memory tier the assembler consumes.
#[async_trait]
pub trait ContextDataProvider: Send + Sync {
    async fn working_memory(&self, user_id: &str, limit: usize) -> Result<Vec<WorkingMemoryTurn>, MemoryError>;

    async fn search_semantic(&self, query: &str, limit: usize) -> Result<Vec<SemanticMatch>, MemoryError>;

    async fn traverse_graph(&self, entity_id: &str, depth: usize) -> Result<Vec<GraphEntity>, MemoryError>;

    async fn session_archive(&self, user_id: &str, days: u32) -> Result<Vec<ArchiveEntry>, MemoryError>;

    async fn stream_buffer(&self, user_id: &str) -> Result<Vec<StreamEvent>, MemoryError>;

    async fn meta_memory(&self, user_id: &str) -> Result<Vec<MetaMemoryEntry>, MemoryError>;

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, MemoryError>;
}

/// Counts tokens for prompt budgeting.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    /// Authoritative count. May be slow.
    async fn count(&self, text: &str) -> Result<usize, MemoryError>;

    /// Cheap estimate, called repeatedly while truncating.
    fn estimate(&self, text: &str) -> usize;
}
