//! `switchyard chat` — Single-message or interactive chat through the inbound handler.
//!
//! Interactive commands:
//! - `/channel <name>` — keep talking, but from another channel
//! - `/stats`          — show the current session
//! - `/end`            — close the session and archive it
//! - `exit`            — quit

use std::io::Write;
use std::sync::Arc;
use switchyard_agent::{ContextAssembler, HeuristicTokenCounter, InboundHandler, StaticPersona};
use switchyard_config::AppConfig;
use switchyard_core::channel::InboundMessage;
use switchyard_core::event::EventBus;
use switchyard_core::memory::ArchiveEntry;
use switchyard_core::tool::{ToolExecutor, ToolRegistry};
use switchyard_memory::InMemoryContextProvider;
use switchyard_session::{InMemorySessionStore, SessionRouter};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::offline::{CurrentTimeTool, EchoProvider, StdoutDelivery};

struct ChatRuntime {
    handler: InboundHandler,
    router: Arc<SessionRouter>,
    memory: InMemoryContextProvider,
    user: String,
}

impl ChatRuntime {
    async fn build(config: &AppConfig, user: String) -> Self {
        let event_bus = Arc::new(EventBus::default());

        let router = Arc::new(
            SessionRouter::new(Arc::new(InMemorySessionStore::from_config(&config.session)))
                .with_event_bus(event_bus.clone()),
        );

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CurrentTimeTool));
        let tools: Arc<dyn ToolExecutor> = Arc::new(registry);

        let memory = InMemoryContextProvider::new();
        memory.set_tools(tools.definitions()).await;

        let assembler = Arc::new(ContextAssembler::from_config(
            Arc::new(memory.clone()),
            Arc::new(HeuristicTokenCounter),
            &config.context,
        ));

        let handler = InboundHandler::new(
            router.clone(),
            Arc::new(StaticPersona::from_config(&config.persona)),
            assembler,
            Arc::new(EchoProvider),
            tools,
            Arc::new(StdoutDelivery),
        )
        .with_config(config)
        .with_event_bus(event_bus);

        Self {
            handler,
            router,
            memory,
            user,
        }
    }

    async fn send(&self, channel: &str, text: &str) {
        let outcome = self
            .handler
            .handle(InboundMessage::new(self.user.as_str(), channel, text))
            .await;

        self.memory.record_turn(&self.user, "user", text).await;
        if !outcome.fallback {
            self.memory.record_turn(&self.user, "assistant", &outcome.reply).await;
        }
        tracing::debug!(
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            duration_ms = outcome.duration_ms,
            "Turn complete"
        );
    }

    async fn stats(&self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(session) = self.router.get_active_session(&self.user).await? else {
            println!("  No active session.");
            return Ok(());
        };
        let stats = self.router.get_session_stats(&session.session_id).await?;
        println!("  Session:  {}", stats.session_id);
        println!("  State:    {}", stats.state);
        println!("  Turns:    {}", stats.turn_count);
        println!("  Channels: {}", session.channel_history.join(" → "));
        println!("  Duration: {}s", stats.duration_secs);
        Ok(())
    }

    async fn end(&self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(session) = self.router.get_active_session(&self.user).await? else {
            println!("  No active session.");
            return Ok(());
        };
        let summary = self.router.end_session(&session.session_id).await?;
        self.memory
            .archive_session(
                &self.user,
                ArchiveEntry {
                    session_id: summary.session_id.clone(),
                    summary: format!(
                        "{} turns across {}",
                        summary.turn_count,
                        summary.channels.join(", ")
                    ),
                    ended_at: summary.ended_at,
                },
            )
            .await;
        println!("  Session {} ended after {} turns.", summary.session_id, summary.turn_count);
        Ok(())
    }
}

pub async fn run(user: String, channel: String, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let runtime = ChatRuntime::build(&config, user).await;

    if let Some(msg) = message {
        runtime.send(&channel, &msg).await;
        return Ok(());
    }

    println!();
    println!("  Switchyard — Interactive Mode (offline echo provider)");
    println!();
    println!("  User:     {}", runtime.user);
    println!("  Channel:  {channel}");
    println!("  Tools:    current_time");
    println!();
    println!("  /channel <name> switches channel, /stats shows the session,");
    println!("  /end closes it, 'exit' quits.");
    println!();

    let mut channel = channel;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  [{channel}] You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/stats" => runtime.stats().await?,
            "/end" => runtime.end().await?,
            _ if line.starts_with("/channel") => match line.split_whitespace().nth(1) {
                Some(next) => {
                    channel = next.to_string();
                    println!("  Switched to {channel}.");
                }
                None => println!("  Usage: /channel <name>"),
            },
            _ => runtime.send(&channel, line).await,
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}
