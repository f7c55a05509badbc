//! `index` command: index a source and summarize the result.

use std::collections::BTreeMap;

use console::style;
use tokio::sync::mpsc;

use crate::sites::{ProgressSink, SiteRegistry};

pub async fn run(registry: &SiteRegistry, source_id: &str) -> anyhow::Result<()> {
    let adapter = registry
        .get(source_id)
        .ok_or_else(|| anyhow::anyhow!("Unknown source: {source_id}"))?;

    let (tx, mut rx) = mpsc::channel::<String>(32);
    let printer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            println!("  {}", style(message).dim());
        }
    });

    let items = adapter.index_content(&ProgressSink::new(tx)).await?;
    let _ = printer.await;

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for item in &items {
        *by_type.entry(item.asset_type.as_str()).or_default() += 1;
    }

    println!(
        "{} {} items from {}",
        style("Indexed").green().bold(),
        items.len(),
        adapter.metadata().name
    );
    for (asset_type, count) in by_type {
        println!("  {asset_type}: {count}");
    }
    for item in items.iter().take(10) {
        println!("  {}  {}", style(&item.id).dim(), item.title);
    }
    if items.len() > 10 {
        println!("  ... and {} more", items.len() - 10);
    }
    Ok(())
}
