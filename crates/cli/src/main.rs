//! Document research CLI
//!
//! Main entry point for the research command-line tool.
//! Answers questions from an indexed document collection with cited sources.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, CheckCommand};
use research_core::logging::{self, LogFormat};
use research_core::{config::AppConfig, AppResult};
use std::path::PathBuf;
use std::process::ExitCode;

/// Document research agent - cited answers from your own documents
#[derive(Parser, Debug)]
#[command(name = "research")]
#[command(about = "Cited answers from an indexed document collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RESEARCH_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RESEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Log line format
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Generation provider (ollama, openai, mock)
    #[arg(short, long, global = true, env = "RESEARCH_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RESEARCH_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Research a question across a set of documents
    Ask(AskCommand),

    /// Check the index collection and document coverage
    Check(CheckCommand),
}

#[tokio::main]
async fn main() -> AppResult<ExitCode> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Defaults, workspace config.yaml and environment
    let mut config = AppConfig::load()?;

    // An explicit --config file is layered on top before flags apply
    if let Some(path) = &cli.config {
        config = config.merge_yaml(path)?;
    }

    let mut config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if let Some(format) = &cli.log_format {
        config.json_logs = format == "json";
    }

    let log_format = if config.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), log_format, config.no_color)?;

    tracing::info!("Research CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Check(_) => "check",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Check(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(true) => tracing::info!("Command completed successfully"),
        Ok(false) => tracing::warn!("Command completed with failures"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(if result? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
