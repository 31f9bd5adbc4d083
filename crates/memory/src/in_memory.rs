//! In-memory context provider — useful for testing and ephemeral agents.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use switchyard_core::error::MemoryError;
use switchyard_core::memory::{
    ArchiveEntry, ContextDataProvider, GraphEntity, MetaMemoryEntry, SemanticMatch, StreamEvent, WorkingMemoryTurn,
};
use switchyard_core::provider::ToolDefinition;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tiers {
    turns: HashMap<String, Vec<WorkingMemoryTurn>>,
    events: HashMap<String, Vec<StreamEvent>>,
    archive: HashMap<String, Vec<ArchiveEntry>>,
    facts: HashMap<String, Vec<MetaMemoryEntry>>,
    documents: Vec<String>,
    entities: HashMap<String, GraphEntity>,
    edges: HashMap<String, Vec<String>>,
    tools: Vec<ToolDefinition>,
}

/// Holds every memory tier in process.
///
/// Semantic search is keyword overlap, not embeddings: the similarity of a
/// document is the fraction of query terms it contains.
#[derive(Clone, Default)]
pub struct InMemoryContextProvider {
    tiers: Arc<RwLock<Tiers>>,
}

impl InMemoryContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_turn(&self, user_id: &str, role: &str, content: &str) {
        self.tiers
            .write()
            .await
            .turns
            .entry(user_id.to_string())
            .or_default()
            .push(WorkingMemoryTurn {
                role: role.to_string(),
                content: content.to_string(),
                timestamp: Utc::now(),
            });
    }

    pub async fn record_event(&self, user_id: &str, event_type: &str, metadata: serde_json::Value) {
        self.tiers
            .write()
            .await
            .events
            .entry(user_id.to_string())
            .or_default()
            .push(StreamEvent {
                event_type: event_type.to_string(),
                metadata,
                timestamp: Utc::now(),
            });
    }

    pub async fn archive_session(&self, user_id: &str, entry: ArchiveEntry) {
        tracing::debug!(user_id, session_id = %entry.session_id, "Session archived");
        self.tiers
            .write()
            .await
            .archive
            .entry(user_id.to_string())
            .or_default()
            .push(entry);
    }

    pub async fn remember_fact(&self, user_id: &str, content: &str) {
        self.tiers
            .write()
            .await
            .facts
            .entry(user_id.to_string())
            .or_default()
            .push(MetaMemoryEntry {
                content: content.to_string(),
            });
    }

    pub async fn add_document(&self, content: &str) {
        self.tiers.write().await.documents.push(content.to_string());
    }

    pub async fn add_entity(&self, id: &str, name: &str, entity_type: &str) {
        self.tiers.write().await.entities.insert(
            id.to_string(),
            GraphEntity {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            },
        );
    }

    /// Undirected edge between two entity ids.
    pub async fn link(&self, a: &str, b: &str) {
        let mut tiers = self.tiers.write().await;
        tiers.edges.entry(a.to_string()).or_default().push(b.to_string());
        tiers.edges.entry(b.to_string()).or_default().push(a.to_string());
    }

    pub async fn set_tools(&self, tools: Vec<ToolDefinition>) {
        self.tiers.write().await.tools = tools;
    }
}

fn keyword_similarity(query_terms: &[String], document: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc = document.to_lowercase();
    let hits = query_terms.iter().filter(|t| doc.contains(t.as_str())).count();
    hits as f32 / query_terms.len() as f32
}

#[async_trait]
impl ContextDataProvider for InMemoryContextProvider {
    async fn working_memory(&self, user_id: &str, limit: usize) -> Result<Vec<WorkingMemoryTurn>, MemoryError> {
        let tiers = self.tiers.read().await;
        let turns = tiers.turns.get(user_id).map(Vec::as_slice).unwrap_or_default();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns[skip..].to_vec())
    }

    async fn search_semantic(&self, query: &str, limit: usize) -> Result<Vec<SemanticMatch>, MemoryError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();

        let tiers = self.tiers.read().await;
        let mut matches: Vec<SemanticMatch> = tiers
            .documents
            .iter()
            .map(|doc| SemanticMatch {
                content: doc.clone(),
                similarity: keyword_similarity(&terms, doc),
            })
            .filter(|m| m.similarity > 0.0)
            .collect();

        matches.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn traverse_graph(&self, entity_id: &str, depth: usize) -> Result<Vec<GraphEntity>, MemoryError> {
        let tiers = self.tiers.read().await;
        if !tiers.entities.contains_key(entity_id) {
            tracing::debug!(entity_id, "Graph traversal requested for unknown entity");
            return Err(MemoryError::QueryFailed(format!("unknown entity '{entity_id}'")));
        }

        // Breadth-first, so closer entities come first.
        let mut seen = HashSet::from([entity_id.to_string()]);
        let mut queue = VecDeque::from([(entity_id.to_string(), 0usize)]);
        let mut found = Vec::new();
        while let Some((id, dist)) = queue.pop_front() {
            if let Some(entity) = tiers.entities.get(&id) {
                found.push(entity.clone());
            }
            if dist == depth {
                continue;
            }
            for next in tiers.edges.get(&id).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    queue.push_back((next.clone(), dist + 1));
                }
            }
        }
        Ok(found)
    }

    async fn session_archive(&self, user_id: &str, days: u32) -> Result<Vec<ArchiveEntry>, MemoryError> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let tiers = self.tiers.read().await;
        Ok(tiers
            .archive
            .get(user_id)
            .into_iter()
            .flatten()
            .filter(|e| e.ended_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn stream_buffer(&self, user_id: &str) -> Result<Vec<StreamEvent>, MemoryError> {
        Ok(self.tiers.read().await.events.get(user_id).cloned().unwrap_or_default())
    }

    async fn meta_memory(&self, user_id: &str) -> Result<Vec<MetaMemoryEntry>, MemoryError> {
        Ok(self.tiers.read().await.facts.get(user_id).cloned().unwrap_or_default())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
        Ok(self.tiers.read().await.tools.clone())
    }
}
