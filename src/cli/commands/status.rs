//! `status` command: manifest summary for the download directory.

use console::style;

use crate::config::Settings;
use crate::services::DownloadTracker;

pub fn run(settings: &Settings) -> anyhow::Result<()> {
    let dir = settings.download_dir();
    let tracker = DownloadTracker::new(&dir)?;
    let summary = tracker.summary();

    println!("{}", style(format!("Manifest: {}", dir.display())).bold());
    println!("  total:       {}", summary.total);
    println!("  complete:    {}", style(summary.complete).green());
    println!("  partial:     {}", summary.partial);
    println!("  in progress: {}", summary.in_progress);
    println!("  pending:     {}", summary.pending);
    println!("  skipped:     {}", summary.skipped);
    println!("  failed:      {}", style(summary.failed).red());
    println!("  restricted:  {}", style(summary.restricted).yellow());
    Ok(())
}
