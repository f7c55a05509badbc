//! CLI parser and dispatch.

mod commands;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::sites::SiteRegistry;

#[derive(Parser)]
#[command(name = "crawlavator")]
#[command(about = "Batch content archiver for websites and podcast feeds")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// List registered sources and their capabilities
    Sites,

    /// Check authentication status for a source
    CheckAuth {
        /// Source ID (see `sites`)
        source_id: String,
    },

    /// Index a source and print what it offers
    Index {
        /// Source ID to index
        source_id: String,
    },

    /// Index a source and download items
    Download {
        /// Source ID to download from
        source_id: String,
        /// Comma-separated item ids (defaults to everything indexed)
        #[arg(long)]
        ids: Option<String>,
        /// Limit number of items (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },

    /// Diff remote indexes against local holdings and download new items
    Sync {
        /// Only sync this source
        #[arg(long)]
        source: Option<String>,
        /// Directory to scan for existing content (defaults to config)
        #[arg(long)]
        search_dir: Option<PathBuf>,
        /// Report the delta without downloading
        #[arg(long)]
        dry_run: bool,
    },

    /// Show manifest summary for the download directory
    Status,

    /// Show recent sync operations
    Logs {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let registry = Arc::new(SiteRegistry::with_builtin(&settings)?);

    match cli.command {
        Commands::Sites => commands::sites::run(&registry),
        Commands::CheckAuth { source_id } => {
            commands::auth::run(&registry, &settings, &source_id).await
        }
        Commands::Index { source_id } => commands::index::run(&registry, &source_id).await,
        Commands::Download {
            source_id,
            ids,
            limit,
        } => commands::download::run(registry, settings, &source_id, ids.as_deref(), limit).await,
        Commands::Sync {
            source,
            search_dir,
            dry_run,
        } => commands::sync::run(registry, settings, source, search_dir, dry_run).await,
        Commands::Status => commands::status::run(&settings),
        Commands::Logs { limit } => commands::logs::run(&settings, limit),
    }
}
