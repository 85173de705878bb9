use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use helpsync::Result;
use helpsync::commands::{run_sync, show_config, show_status};
use helpsync::config::Config;

#[derive(Parser)]
#[command(name = "helpsync")]
#[command(about = "Sync Zendesk help center articles into an OpenAI vector store")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch help center articles and reconcile the vector store
    Sync,
    /// Show tracked documents from the sync state
    Status,
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Sync => run_sync(config).await?,
        Commands::Status => show_status(config).await?,
        Commands::Config => show_config(&config)?,
    }

    Ok(())
}
