//! Context assembly: a token-bounded prompt built from the memory tiers.
//!
//! Sections always come out in this order, whatever order the fetches finish in:
//!
//! | # | Source | Tier | Format |
//! |---|--------|------|--------|
//! | 1 | Working memory | M1 | `role: content` lines |
//! | 2 | Stream buffer | M0 | `[type] metadata` lines |
//! | 3 | Semantic search | M3 | `content (similarity: 0.87)` lines |
//! | 4 | Graph traversal | M4 | `name (type)` lines, only with a focus entity |
//! | 5 | Session archive | M2 | summary lines |
//! | 6 | Meta memory | M5 | raw content lines |
//! | 7 | Tool definitions | - | `name: description` lines, always last |
//!
//! Each section is capped by its [`ContextBudget`] entry using the cheap
//! estimator; the system prompt is capped with the authoritative count.
//! Over-budget text keeps its front and loses its tail. Sources with nothing
//! to say produce no section at all.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use switchyard_config::{ContextBudget, ContextConfig, SourceLimits};
use switchyard_core::error::{ContextError, MemoryError};
use switchyard_core::memory::{
    ArchiveEntry, ContextDataProvider, ContextSource, GraphEntity, MetaMemoryEntry, SemanticMatch, StreamEvent,
    TokenCounter, WorkingMemoryTurn,
};
use switchyard_core::provider::ToolDefinition;

use crate::context::token::truncate_to_budget;

// ── Types ─────────────────────────────────────────────────────────────────

/// One rendered block of context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSection {
    /// Section title, used as its header when rendered.
    pub name: String,
    pub source: ContextSource,
    pub content: String,
    pub tokens: usize,
}

/// The finished prompt context. Built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    /// The (possibly truncated) system prompt.
    pub system_prompt: String,
    pub sections: Vec<ContextSection>,
    /// Always `budget_utilization[SystemPrompt] + Σ section.tokens`.
    pub total_tokens: usize,
    pub budget_utilization: BTreeMap<ContextSource, usize>,
}

impl AssembledContext {
    /// Render into the text of a single system message.
    pub fn render(&self) -> String {
        let mut out = self.system_prompt.clone();
        for section in &self.sections {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            out.push_str(&section.content);
        }
        out
    }

    pub fn section(&self, source: ContextSource) -> Option<&ContextSection> {
        self.sections.iter().find(|s| s.source == source)
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds [`AssembledContext`]s. Holds no per-request state; share it freely.
pub struct ContextAssembler {
    provider: Arc<dyn ContextDataProvider>,
    counter: Arc<dyn TokenCounter>,
    budget: ContextBudget,
    limits: SourceLimits,
}

impl ContextAssembler {
    pub fn new(provider: Arc<dyn ContextDataProvider>, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            provider,
            counter,
            budget: ContextBudget::default(),
            limits: SourceLimits::default(),
        }
    }

    pub fn from_config(
        provider: Arc<dyn ContextDataProvider>,
        counter: Arc<dyn TokenCounter>,
        config: &ContextConfig,
    ) -> Self {
        Self::new(provider, counter)
            .with_budget(config.budget.clone())
            .with_limits(config.sources.clone())
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_limits(mut self, limits: SourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Gather every tier, format, cap, and account for the result.
    ///
    /// Fetches run concurrently. The graph tier is only queried when
    /// `entity_id` is given. Any fetch failure fails the whole assembly.
    pub async fn assemble(
        &self,
        system_prompt: &str,
        user_id: &str,
        query: &str,
        entity_id: Option<&str>,
    ) -> Result<AssembledContext, ContextError> {
        let p = &self.provider;
        let limits = &self.limits;

        let (working, stream, semantic, graph, archive, meta, tools) = tokio::try_join!(
            async {
                p.working_memory(user_id, limits.working_memory_limit)
                    .await
                    .map_err(fetch_error(ContextSource::WorkingMemory))
            },
            async { p.stream_buffer(user_id).await.map_err(fetch_error(ContextSource::StreamBuffer)) },
            async {
                p.search_semantic(query, limits.semantic_limit)
                    .await
                    .map_err(fetch_error(ContextSource::SemanticSearch))
            },
            async {
                match entity_id {
                    Some(id) => p
                        .traverse_graph(id, limits.graph_depth)
                        .await
                        .map(Some)
                        .map_err(fetch_error(ContextSource::GraphTraversal)),
                    None => Ok(None),
                }
            },
            async {
                p.session_archive(user_id, limits.archive_days)
                    .await
                    .map_err(fetch_error(ContextSource::SessionArchive))
            },
            async { p.meta_memory(user_id).await.map_err(fetch_error(ContextSource::MetaMemory)) },
            async { p.tool_definitions().await.map_err(fetch_error(ContextSource::ToolDefinitions)) },
        )?;

        let (system_prompt, system_tokens) = self.fit_system_prompt(system_prompt).await?;

        let candidates = [
            (ContextSource::WorkingMemory, format_working_memory(&working)),
            (ContextSource::StreamBuffer, format_stream_buffer(&stream)),
            (ContextSource::SemanticSearch, format_semantic(&semantic)),
            (
                ContextSource::GraphTraversal,
                graph.as_deref().map(format_graph).unwrap_or_default(),
            ),
            (ContextSource::SessionArchive, format_archive(&archive)),
            (ContextSource::MetaMemory, format_meta(&meta)),
            (ContextSource::ToolDefinitions, format_tools(&tools)),
        ];

        let mut budget_utilization = BTreeMap::from([(ContextSource::SystemPrompt, system_tokens)]);
        let mut sections = Vec::new();
        for (source, content) in candidates {
            let Some(section) = self.fit_section(source, content) else {
                continue;
            };
            budget_utilization.insert(source, section.tokens);
            sections.push(section);
        }

        let total_tokens = system_tokens + sections.iter().map(|s| s.tokens).sum::<usize>();

        tracing::debug!(
            user_id,
            sections = sections.len(),
            total_tokens,
            budget = self.budget.total(),
            "Context assembled"
        );

        Ok(AssembledContext {
            system_prompt,
            sections,
            total_tokens,
            budget_utilization,
        })
    }

    /// Cap one formatted source. `None` when nothing survives.
    fn fit_section(&self, source: ContextSource, content: String) -> Option<ContextSection> {
        if content.is_empty() {
            return None;
        }
        let cap = self.cap(source);
        let fitted = truncate_to_budget(&content, cap, |t| self.counter.estimate(t));
        if fitted.is_empty() {
            tracing::debug!(%source, cap, "Section dropped: nothing fits the budget");
            return None;
        }
        if fitted.len() < content.len() {
            tracing::debug!(%source, cap, kept_bytes = fitted.len(), full_bytes = content.len(), "Section truncated");
        }
        Some(ContextSection {
            name: source.title().to_string(),
            source,
            tokens: self.counter.estimate(fitted),
            content: fitted.to_string(),
        })
    }

    /// Cap the system prompt with the authoritative counter.
    async fn fit_system_prompt(&self, prompt: &str) -> Result<(String, usize), ContextError> {
        let cap = self.budget.system_prompt;
        let full = self.count(prompt).await?;
        if full <= cap || prompt.is_empty() {
            return Ok((prompt.to_string(), full));
        }

        let boundaries: Vec<usize> = prompt.char_indices().map(|(i, _)| i).collect();
        let (mut lo, mut hi) = (0, boundaries.len() - 1);
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.count(&prompt[..boundaries[mid]]).await? <= cap {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        let fitted = &prompt[..boundaries[lo]];
        let tokens = self.count(fitted).await?;
        tracing::debug!(cap, full, tokens, "System prompt truncated");
        Ok((fitted.to_string(), tokens))
    }

    async fn count(&self, text: &str) -> Result<usize, ContextError> {
        self.counter
            .count(text)
            .await
            .map_err(|e| ContextError::TokenCount(e.to_string()))
    }

    fn cap(&self, source: ContextSource) -> usize {
        let b = &self.budget;
        match source {
            ContextSource::SystemPrompt => b.system_prompt,
            ContextSource::WorkingMemory => b.working_memory,
            ContextSource::StreamBuffer => b.stream_buffer,
            ContextSource::SemanticSearch => b.semantic_search,
            ContextSource::GraphTraversal => b.graph_traversal,
            ContextSource::SessionArchive => b.session_archive,
            ContextSource::MetaMemory => b.meta_memory,
            ContextSource::ToolDefinitions => b.tool_definitions,
        }
    }
}

fn fetch_error(tier: ContextSource) -> impl Fn(MemoryError) -> ContextError {
    move |error| ContextError::Fetch { tier, error }
}

// ── Formatters ────────────────────────────────────────────────────────────

fn format_working_memory(turns: &[WorkingMemoryTurn]) -> String {
    join_lines(turns.iter().map(|t| format!("{}: {}", t.role, t.content)))
}

fn format_stream_buffer(events: &[StreamEvent]) -> String {
    join_lines(events.iter().map(|e| match &e.metadata {
        serde_json::Value::Null => format!("[{}]", e.event_type),
        metadata => format!("[{}] {}", e.event_type, metadata),
    }))
}

fn format_semantic(matches: &[SemanticMatch]) -> String {
    join_lines(
        matches
            .iter()
            .map(|m| format!("{} (similarity: {:.2})", m.content, m.similarity)),
    )
}

fn format_graph(entities: &[GraphEntity]) -> String {
    join_lines(entities.iter().map(|e| format!("{} ({})", e.name, e.entity_type)))
}

fn format_archive(entries: &[ArchiveEntry]) -> String {
    join_lines(entries.iter().map(|e| e.summary.clone()))
}

fn format_meta(entries: &[MetaMemoryEntry]) -> String {
    join_lines(entries.iter().map(|e| e.content.clone()))
}

fn format_tools(tools: &[ToolDefinition]) -> String {
    join_lines(tools.iter().map(|t| format!("{}: {}", t.name, t.description)))
}

fn join_lines(lines: impl Iterator<Item = String>) -> String {
    lines.collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token::HeuristicTokenCounter;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Counts one token per char, so budgets read as character limits.
    struct CharCounter;

    #[async_trait]
    impl TokenCounter for CharCounter {
        async fn count(&self, text: &str) -> Result<usize, MemoryError> {
            Ok(text.chars().count())
        }
        fn estimate(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    /// Authoritative count is twice the estimate.
    struct StrictCounter;

    #[async_trait]
    impl TokenCounter for StrictCounter {
        async fn count(&self, text: &str) -> Result<usize, MemoryError> {
            Ok(text.chars().count() * 2)
        }
        fn estimate(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    #[derive(Default)]
    struct FixtureProvider {
        turns: Vec<WorkingMemoryTurn>,
        events: Vec<StreamEvent>,
        matches: Vec<SemanticMatch>,
        entities: Vec<GraphEntity>,
        archive: Vec<ArchiveEntry>,
        facts: Vec<MetaMemoryEntry>,
        tools: Vec<ToolDefinition>,
        fail_semantic: bool,
        graph_called: AtomicBool,
    }

    #[async_trait]
    impl ContextDataProvider for FixtureProvider {
        async fn working_memory(&self, _u: &str, limit: usize) -> Result<Vec<WorkingMemoryTurn>, MemoryError> {
            Ok(self.turns.iter().take(limit).cloned().collect())
        }
        async fn search_semantic(&self, _q: &str, limit: usize) -> Result<Vec<SemanticMatch>, MemoryError> {
            if self.fail_semantic {
                return Err(MemoryError::QueryFailed("vector index offline".into()));
            }
            Ok(self.matches.iter().take(limit).cloned().collect())
        }
        async fn traverse_graph(&self, _e: &str, _d: usize) -> Result<Vec<GraphEntity>, MemoryError> {
            self.graph_called.store(true, Ordering::SeqCst);
            Ok(self.entities.clone())
        }
        async fn session_archive(&self, _u: &str, _d: u32) -> Result<Vec<ArchiveEntry>, MemoryError> {
            Ok(self.archive.clone())
        }
        async fn stream_buffer(&self, _u: &str) -> Result<Vec<StreamEvent>, MemoryError> {
            Ok(self.events.clone())
        }
        async fn meta_memory(&self, _u: &str) -> Result<Vec<MetaMemoryEntry>, MemoryError> {
            Ok(self.facts.clone())
        }
        async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
            Ok(self.tools.clone())
        }
    }

    fn turn(role: &str, content: &str) -> WorkingMemoryTurn {
        WorkingMemoryTurn {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    fn full_provider() -> FixtureProvider {
        FixtureProvider {
            turns: vec![turn("user", "Book me a flight"), turn("assistant", "Where to?")],
            events: vec![StreamEvent {
                event_type: "location".into(),
                metadata: serde_json::json!({"city": "Lisbon"}),
                timestamp: Utc::now(),
            }],
            matches: vec![SemanticMatch {
                content: "Prefers window seats".into(),
                similarity: 0.87,
            }],
            entities: vec![GraphEntity {
                name: "Acme Corp".into(),
                entity_type: "company".into(),
            }],
            archive: vec![ArchiveEntry {
                session_id: "s-0".into(),
                summary: "Discussed travel budget".into(),
                ended_at: Utc::now(),
            }],
            facts: vec![MetaMemoryEntry {
                content: "Vegetarian".into(),
            }],
            tools: vec![ToolDefinition {
                name: "search_flights".into(),
                description: "Find flights between two airports".into(),
                parameters: serde_json::json!({}),
            }],
            ..Default::default()
        }
    }

    fn assembler(provider: FixtureProvider) -> ContextAssembler {
        ContextAssembler::new(Arc::new(provider), Arc::new(HeuristicTokenCounter))
    }

    fn assert_totals(ctx: &AssembledContext) {
        let sum: usize = ctx.sections.iter().map(|s| s.tokens).sum();
        assert_eq!(ctx.total_tokens, ctx.budget_utilization[&ContextSource::SystemPrompt] + sum);
    }

    #[tokio::test]
    async fn sections_follow_priority_order_with_tools_last() {
        let ctx = assembler(full_provider())
            .assemble("You are helpful.", "mark", "flight", Some("mark"))
            .await
            .unwrap();

        let order: Vec<_> = ctx.sections.iter().map(|s| s.source).collect();
        assert_eq!(
            order,
            vec![
                ContextSource::WorkingMemory,
                ContextSource::StreamBuffer,
                ContextSource::SemanticSearch,
                ContextSource::GraphTraversal,
                ContextSource::SessionArchive,
                ContextSource::MetaMemory,
                ContextSource::ToolDefinitions,
            ]
        );
        assert_totals(&ctx);
    }

    #[tokio::test]
    async fn sections_use_their_formats() {
        let ctx = assembler(full_provider())
            .assemble("sys", "mark", "flight", Some("mark"))
            .await
            .unwrap();

        let content = |s| ctx.section(s).unwrap().content.as_str();
        assert_eq!(content(ContextSource::WorkingMemory), "user: Book me a flight\nassistant: Where to?");
        assert_eq!(content(ContextSource::StreamBuffer), "[location] {\"city\":\"Lisbon\"}");
        assert_eq!(content(ContextSource::SemanticSearch), "Prefers window seats (similarity: 0.87)");
        assert_eq!(content(ContextSource::GraphTraversal), "Acme Corp (company)");
        assert_eq!(content(ContextSource::SessionArchive), "Discussed travel budget");
        assert_eq!(content(ContextSource::MetaMemory), "Vegetarian");
        assert_eq!(
            content(ContextSource::ToolDefinitions),
            "search_flights: Find flights between two airports"
        );
    }

    #[tokio::test]
    async fn graph_is_skipped_without_entity() {
        let provider = Arc::new(full_provider());
        let assembler = ContextAssembler::new(provider.clone(), Arc::new(HeuristicTokenCounter));
        let ctx = assembler.assemble("sys", "mark", "flight", None).await.unwrap();

        assert!(!provider.graph_called.load(Ordering::SeqCst));
        assert!(ctx.section(ContextSource::GraphTraversal).is_none());
        assert!(!ctx.budget_utilization.contains_key(&ContextSource::GraphTraversal));
        assert_totals(&ctx);
    }

    #[tokio::test]
    async fn empty_provider_yields_only_system_prompt() {
        let ctx = assembler(FixtureProvider::default())
            .assemble("You are helpful.", "mark", "hi", Some("mark"))
            .await
            .unwrap();

        assert!(ctx.sections.is_empty());
        assert_eq!(ctx.total_tokens, ctx.budget_utilization[&ContextSource::SystemPrompt]);
        assert_eq!(ctx.budget_utilization.len(), 1);
        assert_eq!(ctx.render(), "You are helpful.");
    }

    #[tokio::test]
    async fn empty_system_prompt_and_empty_sources() {
        let ctx = assembler(FixtureProvider::default())
            .assemble("", "mark", "", None)
            .await
            .unwrap();
        assert_eq!(ctx.total_tokens, 0);
        assert_eq!(ctx.budget_utilization[&ContextSource::SystemPrompt], 0);
    }

    #[tokio::test]
    async fn over_budget_section_is_cut_to_a_prefix() {
        let provider = FixtureProvider {
            turns: vec![turn("user", "please plan my whole trip")],
            ..Default::default()
        };
        let full = "user: please plan my whole trip";
        assert_eq!(full.chars().count(), 31);

        let budget = ContextBudget {
            working_memory: 10,
            ..ContextBudget::default()
        };
        let ctx = ContextAssembler::new(Arc::new(provider), Arc::new(CharCounter))
            .with_budget(budget)
            .assemble("sys", "mark", "trip", None)
            .await
            .unwrap();

        let section = ctx.section(ContextSource::WorkingMemory).unwrap();
        assert!(section.content.chars().count() <= 10);
        assert!(full.starts_with(&section.content));
        assert!(!section.content.ends_with('p'));
        assert!(section.tokens <= 10);
        assert_totals(&ctx);
    }

    #[tokio::test]
    async fn zero_budget_source_is_omitted() {
        let budget = ContextBudget {
            meta_memory: 0,
            ..ContextBudget::default()
        };
        let ctx = assembler(full_provider())
            .with_budget(budget)
            .assemble("sys", "mark", "flight", None)
            .await
            .unwrap();
        assert!(ctx.section(ContextSource::MetaMemory).is_none());
        assert!(!ctx.budget_utilization.contains_key(&ContextSource::MetaMemory));
        assert_totals(&ctx);
    }

    #[tokio::test]
    async fn system_prompt_uses_authoritative_count() {
        let budget = ContextBudget {
            system_prompt: 10,
            ..ContextBudget::default()
        };
        let prompt = "You are a meticulous travel agent.";
        let ctx = ContextAssembler::new(Arc::new(FixtureProvider::default()), Arc::new(StrictCounter))
            .with_budget(budget)
            .assemble(prompt, "mark", "", None)
            .await
            .unwrap();

        // count() doubles, so only five chars fit.
        assert_eq!(ctx.system_prompt, "You a");
        assert_eq!(ctx.budget_utilization[&ContextSource::SystemPrompt], 10);
        assert!(prompt.starts_with(&ctx.system_prompt));
    }

    #[tokio::test]
    async fn fetch_failure_fails_assembly() {
        let provider = FixtureProvider {
            fail_semantic: true,
            ..full_provider()
        };
        let err = assembler(provider)
            .assemble("sys", "mark", "flight", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContextError::Fetch {
                tier: ContextSource::SemanticSearch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn totals_hold_for_tight_budgets() {
        for cap in [0, 1, 3, 7, 50] {
            let budget = ContextBudget {
                system_prompt: cap,
                working_memory: cap,
                stream_buffer: cap,
                semantic_search: cap,
                graph_traversal: cap,
                session_archive: cap,
                meta_memory: cap,
                tool_definitions: cap,
            };
            let ctx = assembler(full_provider())
                .with_budget(budget)
                .assemble("You are a helpful assistant.", "mark", "flight", Some("mark"))
                .await
                .unwrap();
            assert_totals(&ctx);
            for section in &ctx.sections {
                assert!(section.tokens <= cap);
                assert!(!section.content.is_empty());
            }
        }
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let a = assembler(full_provider());
        let first = a.assemble("sys", "mark", "flight", Some("mark")).await.unwrap();
        let second = a.assemble("sys", "mark", "flight", Some("mark")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn render_adds_section_headers() {
        let ctx = assembler(full_provider())
            .assemble("sys", "mark", "flight", None)
            .await
            .unwrap();
        let rendered = ctx.render();
        assert!(rendered.starts_with("sys\n\n[Recent Conversation]\nuser: Book me a flight"));
        assert!(rendered.ends_with("[Available Tools]\nsearch_flights: Find flights between two airports"));
    }
}
