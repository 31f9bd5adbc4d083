//! Switchyard CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write the default config file
//! - `config`  — Show, validate, or locate the configuration
//! - `chat`    — Drive the full inbound pipeline offline, one message or interactively

use clap::{Parser, Subcommand};

mod commands;
mod offline;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — cross-channel agent orchestrator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Chat through the inbound handler using offline collaborators
    Chat {
        /// User id to chat as
        #[arg(short, long, default_value = "local-user")]
        user: String,

        /// Channel the first message arrives on
        #[arg(short, long, default_value = "cli")]
        channel: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as TOML (default)
    Show,
    /// Load and validate the configuration
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
        Commands::Chat {
            user,
            channel,
            message,
        } => commands::chat::run(user, channel, message).await?,
    }

    Ok(())
}
