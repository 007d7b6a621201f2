//! CLI surface: the process entry point's command parser and dispatcher.
//!
//! Grounded on the teacher's `cli/commands/mod.rs` (one module per
//! subcommand, `clap` derive, `console`-styled status lines), generalized
//! from FOIA source/scrape/analyze commands to this crate's serve/worker/
//! migrate/job surface.

mod commands;
mod helpers;

use clap::{Parser, Subcommand};

use crate::config::load_settings;

/// Check if verbose mode is enabled, ahead of clap parsing it, so the
/// tracing subscriber in `main` can pick its default filter before `run`
/// gets a chance to hand back a parsed `Cli`.
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Parser)]
#[command(name = "bulkextract")]
#[command(about = "Bulk document extraction orchestrator")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./bulkextract.toml if present)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run database migrations
    Migrate,
    /// Start the HTTP server
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the broker worker loop (discovery + extraction task handlers)
    Worker {
        /// Number of documents processed concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Job management
    Job {
        #[command(subcommand)]
        action: commands::job::JobCommand,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref());

    match cli.command {
        Command::Migrate => commands::migrate::cmd_migrate(&settings).await,
        Command::Serve { bind } => commands::serve::cmd_serve(settings, bind).await,
        Command::Worker { concurrency } => commands::worker::cmd_worker(settings, concurrency).await,
        Command::Job { action } => commands::job::dispatch(&settings, action).await,
    }
}
