//! codecrafter CLI — the main entry point.
//!
//! Commands:
//! - `onboard`   — Initialize config directory
//! - `agent`     — Interactive autonomous coding session
//! - `providers` — Probe which model backends are configured

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "codecrafter",
    about = "codecrafter — an autonomous coding-assistant agent",
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
    /// Initialize configuration directory
    Onboard,

    /// Start an interactive session with the agent
    Agent {
        /// Model override (falls back to config / provider default)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show which model backends are configured
    Providers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Agent { model } => commands::agent::run(model).await?,
        Commands::Providers => commands::providers::run().await?,
    }

    Ok(())
}
