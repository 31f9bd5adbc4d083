//! No-op context provider — every memory tier is empty.

use async_trait::async_trait;
use switchyard_core::error::MemoryError;
use switchyard_core::memory::{
    ArchiveEntry, ContextDataProvider, GraphEntity, MetaMemoryEntry, SemanticMatch, StreamEvent, WorkingMemoryTurn,
};
use switchyard_core::provider::ToolDefinition;

/// A provider that remembers nothing. Tool definitions can still be supplied.
#[derive(Default)]
pub struct NoopContextProvider {
    tools: Vec<ToolDefinition>,
}

impl NoopContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: Vec<ToolDefinition>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ContextDataProvider for NoopContextProvider {
    async fn working_memory(&self, _user_id: &str, _limit: usize) -> Result<Vec<WorkingMemoryTurn>, MemoryError> {
        Ok(Vec::new())
    }

    async fn search_semantic(&self, _query: &str, _limit: usize) -> Result<Vec<SemanticMatch>, MemoryError> {
        Ok(Vec::new())
    }

    async fn traverse_graph(&self, _entity_id: &str, _depth: usize) -> Result<Vec<GraphEntity>, MemoryError> {
        Ok(Vec::new())
    }

    async fn session_archive(&self, _user_id: &str, _days: u32) -> Result<Vec<ArchiveEntry>, MemoryError> {
        Ok(Vec::new())
    }

    async fn stream_buffer(&self, _user_id: &str) -> Result<Vec<StreamEvent>, MemoryError> {
        Ok(Vec::new())
    }

    async fn meta_memory(&self, _user_id: &str) -> Result<Vec<MetaMemoryEntry>, MemoryError> {
        Ok(Vec::new())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
        Ok(self.tools.clone())
    }
}
