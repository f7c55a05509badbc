//! Crawlavator - batch content archiver.
//!
//! A tool for indexing and archiving material from multiple websites and
//! podcast feeds, tracking what has already been retrieved.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlavator::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "crawlavator=info"
    } else {
        "crawlavator=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
