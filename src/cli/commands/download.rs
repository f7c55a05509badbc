//! `download` command: index a source, start a batch session, render it.

use std::sync::Arc;

use console::style;

use crate::cli::render::render_events;
use crate::config::Settings;
use crate::services::batch::{BatchConfig, BatchRunner, IndexSnapshot, SessionRegistry};
use crate::sites::{ProgressSink, SiteRegistry};

pub async fn run(
    registry: Arc<SiteRegistry>,
    settings: Settings,
    source_id: &str,
    ids: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let adapter = registry
        .get(source_id)
        .ok_or_else(|| anyhow::anyhow!("Unknown source: {source_id}"))?;

    println!("{}", style(format!("Indexing {source_id}...")).cyan());
    let items = adapter.index_content(&ProgressSink::discard()).await?;
    if items.is_empty() {
        anyhow::bail!("Nothing indexed for {source_id}");
    }

    let mut item_ids: Vec<String> = match ids {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => items.iter().map(|i| i.id.clone()).collect(),
    };
    if limit > 0 {
        item_ids.truncate(limit);
    }

    let snapshot = IndexSnapshot::from_items(items);
    let config = BatchConfig::from_settings(&settings);
    let keepalive = config.keepalive_interval;
    let runner = Arc::new(BatchRunner::new(registry, settings, config));
    let sessions = SessionRegistry::new();

    let session_id = runner
        .spawn_download(&sessions, source_id.to_string(), snapshot, item_ids)
        .await;
    let stream = sessions
        .claim(session_id, keepalive)
        .await
        .expect("freshly opened session");

    render_events(stream).await
}
