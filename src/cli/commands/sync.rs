//! `sync` command: diff sources against local holdings, then download.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;

use crate::cli::render::render_events;
use crate::config::Settings;
use crate::services::batch::{BatchConfig, BatchRunner, SessionRegistry};
use crate::services::SyncService;
use crate::sites::{ProgressSink, SiteRegistry};

pub async fn run(
    registry: Arc<SiteRegistry>,
    settings: Settings,
    source: Option<String>,
    search_dir: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let search_dir = search_dir.unwrap_or_else(|| settings.search_dir());

    if dry_run {
        return dry_run_report(&registry, &settings, source.as_deref(), &search_dir).await;
    }

    let config = BatchConfig::from_settings(&settings);
    let keepalive = config.keepalive_interval;
    let runner = Arc::new(BatchRunner::new(registry, settings, config));
    let sessions = SessionRegistry::new();

    let session_id = runner.spawn_sync_all(&sessions, source, search_dir).await;
    let stream = sessions
        .claim(session_id, keepalive)
        .await
        .expect("freshly opened session");

    render_events(stream).await
}

/// Report the delta per source without downloading anything.
async fn dry_run_report(
    registry: &SiteRegistry,
    settings: &Settings,
    source: Option<&str>,
    search_dir: &std::path::Path,
) -> anyhow::Result<()> {
    let sync_service = SyncService::new(settings.download_dir());

    let adapters: Vec<_> = registry
        .ordered_for_batch()
        .into_iter()
        .filter(|a| source.map(|s| a.metadata().id == s).unwrap_or(true))
        .collect();
    if adapters.is_empty() {
        anyhow::bail!("Unknown source: {}", source.unwrap_or("<none>"));
    }

    for adapter in adapters {
        let meta = adapter.metadata();
        println!("{}", style(format!("Checking {}...", meta.name)).cyan());

        let items = match adapter.index_content(&ProgressSink::discard()).await {
            Ok(items) => items,
            Err(e) => {
                println!("  {} indexing failed: {e}", style("✗").red());
                continue;
            }
        };

        let report = sync_service.sync_source(meta.id, meta.name, &items, Some(search_dir));
        println!(
            "  {} indexed, {} local, {} new",
            report.indexed, report.local, report.new
        );
        for preview in &report.preview {
            println!("    {}  {}", style(&preview.id).dim(), preview.title);
        }
        if report.new > report.preview.len() {
            println!("    ... and {} more", report.new - report.preview.len());
        }
    }
    Ok(())
}
