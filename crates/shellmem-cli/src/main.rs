//! Shellmem CLI - stdio tool server for agents
//!
//! Usage:
//!   shellmem [serve]  - Serve tool calls over stdin/stdout (default)
//!   shellmem tools    - Print the advertised tools as JSON

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shellmem_core::{Dispatcher, Executor, ToolRegistry};
use shellmem_memory::Mem0Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServeArgs;

#[derive(Parser)]
#[command(name = "shellmem")]
#[command(author = "HeyBattle1")]
#[command(version)]
#[command(about = "Shell execution and long-term memory as agent tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tool calls over stdin/stdout
    Serve,

    /// Print the tool registry and exit
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout is reserved for JSON-RPC frames
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&cli.serve).await,
        Commands::Tools => {
            let registry = ToolRegistry::builtin();
            let json = serde_json::to_string_pretty(registry.list_tools())
                .context("Failed to render tool list")?;
            println!("{}", json);
            Ok(())
        }
    }
}

async fn serve(args: &ServeArgs) -> anyhow::Result<()> {
    let memory = Mem0Client::new(args.memory_config())
        .context("Failed to build memory service client")?;
    let executor = Executor::new(args.executor_config());
    let dispatcher = Dispatcher::new(
        ToolRegistry::builtin(),
        executor,
        Arc::new(memory),
        args.default_user.clone(),
    );

    info!(
        default_user = %args.default_user,
        memory_url = %args.memory_url,
        "Starting shellmem"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    shellmem_core::serve(stdin, stdout, &dispatcher)
        .await
        .context("stdio transport failed")?;

    Ok(())
}
