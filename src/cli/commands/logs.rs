//! `logs` command: recent sync operations.

use console::style;

use crate::config::Settings;
use crate::services::SyncService;

pub fn run(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let sync_service = SyncService::new(settings.download_dir());
    let records = sync_service.recent_logs(limit)?;

    if records.is_empty() {
        println!("No sync operations recorded yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {}  {} source(s): {} downloaded, {} skipped, {} errors ({:.1}s)",
            style(record.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
            record.operation,
            record.sources_checked,
            style(record.total_downloaded).green(),
            record.total_skipped,
            if record.total_errors > 0 {
                style(record.total_errors).red()
            } else {
                style(record.total_errors).dim()
            },
            record.duration_seconds,
        );
        for detail in &record.source_details {
            let note = detail
                .error
                .as_deref()
                .map(|e| format!("  [{e}]"))
                .unwrap_or_default();
            println!(
                "    {:<28} {} indexed, {} local, {} new, {} downloaded{}",
                detail.source,
                detail.indexed,
                detail.local,
                detail.new_available,
                detail.downloaded,
                note
            );
        }
    }
    Ok(())
}
