//! Batch worker: drives index → sync → download across one or many
//! sources.
//!
//! One logical worker per session; items are processed strictly
//! sequentially to respect per-source rate limits. A single item's failure
//! never escapes its iteration: every outcome is routed into the tracker
//! and surfaced as an event, and the loop moves on. Multi-source runs add
//! stall detection, an error-burst circuit breaker, and exactly one retry
//! pass per run.

mod sessions;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::models::{AssetType, ContentItem};
use crate::services::sync::{SourceDetail, SyncLogRecord, SyncService};
use crate::services::DownloadTracker;
use crate::sites::{ItemOutcome, ProgressSink, SiteAdapter, SiteRegistry};
use crate::utils::sanitize_filename;

pub use sessions::{EventStream, SessionId, SessionRegistry};
pub use types::{
    AbandonReason, BatchConfig, BatchEvent, BatchStats, IndexSnapshot, SourcePassOutcome,
    SyncAllResult,
};

/// Result of one item iteration inside a pass.
enum ItemResult {
    Skipped,
    Succeeded,
    Failed,
}

/// Drives batch download and sync-all operations, emitting [`BatchEvent`]s.
pub struct BatchRunner {
    registry: Arc<SiteRegistry>,
    settings: Settings,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(registry: Arc<SiteRegistry>, settings: Settings, config: BatchConfig) -> Self {
        Self {
            registry,
            settings,
            config,
        }
    }

    /// Start a "download these ids" session; returns immediately.
    pub async fn spawn_download(
        self: Arc<Self>,
        sessions: &SessionRegistry,
        source_id: String,
        snapshot: IndexSnapshot,
        item_ids: Vec<String>,
    ) -> SessionId {
        let (id, tx) = sessions.open().await;
        let runner = self;
        tokio::spawn(async move {
            runner.run_download(&source_id, &snapshot, &item_ids, tx).await;
        });
        id
    }

    /// Start a "sync all sources, download what's new" session.
    pub async fn spawn_sync_all(
        self: Arc<Self>,
        sessions: &SessionRegistry,
        source_filter: Option<String>,
        search_dir: PathBuf,
    ) -> SessionId {
        let (id, tx) = sessions.open().await;
        let runner = self;
        tokio::spawn(async move {
            runner
                .run_sync_all(source_filter.as_deref(), &search_dir, tx)
                .await;
        });
        id
    }

    /// Download a list of item ids from one source's index snapshot.
    pub async fn run_download(
        &self,
        source_id: &str,
        snapshot: &IndexSnapshot,
        item_ids: &[String],
        tx: mpsc::Sender<BatchEvent>,
    ) {
        if item_ids.is_empty() {
            let _ = tx
                .send(BatchEvent::Error {
                    message: "No items selected".to_string(),
                })
                .await;
            return;
        }

        let Some(adapter) = self.registry.get(source_id) else {
            let _ = tx
                .send(BatchEvent::Error {
                    message: format!("Unknown source: {source_id}"),
                })
                .await;
            return;
        };

        let downloads_dir = self.settings.download_dir();
        let mut tracker = match DownloadTracker::new(&downloads_dir) {
            Ok(t) => t,
            Err(e) => {
                let _ = tx
                    .send(BatchEvent::Error {
                        message: format!("Cannot open download directory: {e}"),
                    })
                    .await;
                return;
            }
        };

        let (sink, _forwarder) = progress_forwarder(tx.clone());
        let mut stats = BatchStats::default();
        let total = item_ids.len();

        for (i, item_id) in item_ids.iter().enumerate() {
            let Some(item) = snapshot.get(item_id) else {
                let _ = tx
                    .send(BatchEvent::warning(format!("Item not found: {item_id}")))
                    .await;
                stats.failed += 1;
                continue;
            };

            let percent = ((i + 1) as f64 / total as f64) * 100.0;
            let _ = tx
                .send(BatchEvent::Progress {
                    current: i + 1,
                    total,
                    percent,
                    message: format!("[{}/{}] {}", i + 1, total, truncate(&item.title, 40)),
                })
                .await;

            match self
                .download_one(adapter.as_ref(), item, &mut tracker, &sink, &tx, false)
                .await
            {
                ItemResult::Skipped => stats.skipped += 1,
                ItemResult::Succeeded => stats.completed += 1,
                ItemResult::Failed => stats.failed += 1,
            }
        }

        if let Err(e) = tracker.save() {
            tracing::warn!(error = %e, "final manifest save failed");
        }

        let _ = tx
            .send(BatchEvent::Complete {
                message: format!(
                    "Download complete! {} succeeded, {} skipped, {} failed.",
                    stats.completed, stats.skipped, stats.failed
                ),
                folder: downloads_dir.display().to_string(),
                stats: tracker.summary(),
            })
            .await;
    }

    /// Index every source, diff against local state, and download what is
    /// new. Heavy sources run last; abandoned sources get one retry pass.
    pub async fn run_sync_all(
        &self,
        source_filter: Option<&str>,
        search_dir: &Path,
        tx: mpsc::Sender<BatchEvent>,
    ) {
        let started = Instant::now();

        let adapters: Vec<_> = self
            .registry
            .ordered_for_batch()
            .into_iter()
            .filter(|a| source_filter.map(|f| a.metadata().id == f).unwrap_or(true))
            .collect();

        if adapters.is_empty() {
            let _ = tx
                .send(BatchEvent::Error {
                    message: match source_filter {
                        Some(f) => format!("Unknown source: {f}"),
                        None => "No sources registered".to_string(),
                    },
                })
                .await;
            return;
        }

        let downloads_dir = self.settings.download_dir();
        let mut tracker = match DownloadTracker::new(&downloads_dir) {
            Ok(t) => t,
            Err(e) => {
                let _ = tx
                    .send(BatchEvent::Error {
                        message: format!("Cannot open download directory: {e}"),
                    })
                    .await;
                return;
            }
        };
        let sync_service = SyncService::new(&downloads_dir);
        let (sink, _forwarder) = progress_forwarder(tx.clone());

        let mut result = SyncAllResult {
            sources_checked: adapters.len(),
            ..Default::default()
        };
        // (adapter, items, index into result.details)
        let mut retry_queue: Vec<(Arc<dyn SiteAdapter>, Vec<ContentItem>, usize)> = Vec::new();

        for adapter in &adapters {
            let meta = adapter.metadata();
            let _ = tx
                .send(BatchEvent::info(format!("Checking {}...", meta.name)))
                .await;

            let mut detail = SourceDetail {
                source: meta.name.to_string(),
                ..Default::default()
            };

            let indexed = match adapter.index_content(&sink).await {
                Ok(items) => items,
                Err(e) => {
                    let message = truncate(&e.to_string(), 200).to_string();
                    let _ = tx
                        .send(BatchEvent::warning(format!(
                            "Indexing failed for {}: {}",
                            meta.name, message
                        )))
                        .await;
                    detail.error = Some(message);
                    result.total_errors += 1;
                    result.details.push(detail);
                    continue;
                }
            };

            let report = sync_service.sync_source(meta.id, meta.name, &indexed, Some(search_dir));
            detail.indexed = report.indexed;
            detail.local = report.local;
            detail.new_available = report.new;

            let _ = tx
                .send(BatchEvent::info(format!(
                    "{}: {} indexed, {} local, {} new",
                    meta.name, report.indexed, report.local, report.new
                )))
                .await;

            if report.new_items.is_empty() {
                result.details.push(detail);
                continue;
            }

            let outcome = self
                .download_source_items(
                    adapter.as_ref(),
                    &report.new_items,
                    &mut tracker,
                    &sink,
                    &tx,
                    false,
                )
                .await;

            detail.downloaded = outcome.downloaded;
            detail.download_errors = outcome.errors;
            result.total_downloaded += outcome.downloaded;
            result.total_skipped += outcome.skipped;
            result.total_errors += outcome.errors;

            let detail_index = result.details.len();
            if let Some(reason) = outcome.abandoned {
                let _ = tx
                    .send(BatchEvent::warning(format!(
                        "Abandoning {} ({}), queued for one retry",
                        meta.name,
                        reason.as_str()
                    )))
                    .await;
                retry_queue.push((adapter.clone(), report.new_items, detail_index));
            } else {
                let _ = tx
                    .send(BatchEvent::Success {
                        message: format!(
                            "{}: {} downloaded, {} errors",
                            meta.name, outcome.downloaded, outcome.errors
                        ),
                    })
                    .await;
            }
            result.details.push(detail);
        }

        // Exactly one retry pass for abandoned sources.
        if !retry_queue.is_empty() {
            let _ = tx
                .send(BatchEvent::info(format!(
                    "Retry pass: {} source(s)",
                    retry_queue.len()
                )))
                .await;

            for (adapter, items, detail_index) in retry_queue {
                let meta = adapter.metadata();
                let outcome = self
                    .download_source_items(adapter.as_ref(), &items, &mut tracker, &sink, &tx, true)
                    .await;

                let detail = &mut result.details[detail_index];
                detail.downloaded += outcome.downloaded;
                detail.download_errors += outcome.errors;
                result.total_downloaded += outcome.downloaded;
                result.total_skipped += outcome.skipped;
                result.total_errors += outcome.errors;

                if outcome.abandoned.is_some() {
                    let _ = tx
                        .send(BatchEvent::warning(format!(
                            "{} failed again on retry",
                            meta.name
                        )))
                        .await;
                    detail.error = Some("failed after retry".to_string());
                    result.failed_sources.push(meta.name.to_string());
                }
            }
        }

        if let Err(e) = tracker.save() {
            tracing::warn!(error = %e, "final manifest save failed");
        }

        let record = SyncLogRecord {
            timestamp: Utc::now(),
            operation: "sync_all".to_string(),
            search_directory: search_dir.display().to_string(),
            sources_checked: result.sources_checked,
            total_downloaded: result.total_downloaded,
            total_skipped: result.total_skipped,
            total_errors: result.total_errors,
            duration_seconds: started.elapsed().as_secs_f64(),
            source_details: result.details.clone(),
        };
        if let Err(e) = sync_service.log_sync_operation(&record) {
            tracing::warn!(error = %e, "could not append sync log");
        }

        let _ = tx
            .send(BatchEvent::Complete {
                message: format!(
                    "Sync complete! {} downloaded, {} skipped, {} errors across {} source(s).",
                    result.total_downloaded,
                    result.total_skipped,
                    result.total_errors,
                    result.sources_checked
                ),
                folder: downloads_dir.display().to_string(),
                stats: tracker.summary(),
            })
            .await;
    }

    /// Download one source's items with stall detection and the
    /// error-burst circuit breaker. Used for both the main and retry pass;
    /// `retry_failed` re-admits entries the main pass left as failed.
    async fn download_source_items(
        &self,
        adapter: &dyn SiteAdapter,
        items: &[ContentItem],
        tracker: &mut DownloadTracker,
        sink: &ProgressSink,
        tx: &mpsc::Sender<BatchEvent>,
        retry_failed: bool,
    ) -> SourcePassOutcome {
        let mut outcome = SourcePassOutcome::default();
        let pass_start = Instant::now();
        let mut attempts = 0usize;
        let mut consecutive_failures = 0usize;
        let total = items.len();

        for (i, item) in items.iter().enumerate() {
            // Non-blocking stall poll: a source that has been attempting
            // for longer than the window without a single success gets
            // abandoned for this pass.
            if outcome.downloaded == 0
                && attempts > 0
                && pass_start.elapsed() > self.config.stall_window
            {
                outcome.abandoned = Some(AbandonReason::Stalled);
                return outcome;
            }

            let percent = ((i + 1) as f64 / total as f64) * 100.0;
            let _ = tx
                .send(BatchEvent::Progress {
                    current: i + 1,
                    total,
                    percent,
                    message: format!("[{}/{}] {}", i + 1, total, truncate(&item.title, 40)),
                })
                .await;

            match self
                .download_one(adapter, item, tracker, sink, tx, retry_failed)
                .await
            {
                ItemResult::Skipped => outcome.skipped += 1,
                ItemResult::Succeeded => {
                    attempts += 1;
                    outcome.downloaded += 1;
                    consecutive_failures = 0;
                }
                ItemResult::Failed => {
                    attempts += 1;
                    outcome.errors += 1;
                    consecutive_failures += 1;
                    if outcome.downloaded == 0
                        && consecutive_failures > self.config.error_burst_threshold
                    {
                        outcome.abandoned = Some(AbandonReason::ErrorBurst);
                        return outcome;
                    }
                }
            }
        }

        outcome
    }

    /// One item, end to end: gate, destination, adapter call, tracker
    /// routing, event, rate-limit delay. The retry pass widens the gate so
    /// failed entries get their second chance; restricted entries never do.
    async fn download_one(
        &self,
        adapter: &dyn SiteAdapter,
        item: &ContentItem,
        tracker: &mut DownloadTracker,
        sink: &ProgressSink,
        tx: &mpsc::Sender<BatchEvent>,
        retry_failed: bool,
    ) -> ItemResult {
        // The gate is consulted before every attempt, never cached.
        let eligible = if retry_failed {
            tracker.should_retry(&item.id, None)
        } else {
            tracker.should_download(&item.id, None)
        };
        if !eligible {
            let _ = tx
                .send(BatchEvent::status(format!(
                    "Skipping (already complete): {}",
                    truncate(&item.title, 40)
                )))
                .await;
            return ItemResult::Skipped;
        }

        let dest_dir = self.destination_dir(item);
        if let Err(e) = tracker.start_download(
            &item.id,
            &item.title,
            &item.url,
            item.asset_type,
            &item.category,
            &dest_dir.display().to_string(),
        ) {
            tracing::warn!(error = %e, id = %item.id, "could not record download start");
        }

        let result = adapter.download_item(item, &dest_dir, sink).await;

        let item_result = match result {
            ItemOutcome::Completed {
                local_path,
                size,
                message,
            } => {
                if let Err(e) = tracker.complete_download(
                    &item.id,
                    &local_path.display().to_string(),
                    size,
                    None,
                ) {
                    tracing::warn!(error = %e, id = %item.id, "could not record completion");
                }
                tracker.mark_accessible(&item.url, &item.title);
                let _ = tx
                    .send(BatchEvent::status(format!(
                        "✓ {}: {}",
                        truncate(&item.title, 40),
                        message
                    )))
                    .await;
                ItemResult::Succeeded
            }
            ItemOutcome::Failed { error } => {
                if let Err(e) = tracker.fail_download(&item.id, &error) {
                    tracing::warn!(error = %e, id = %item.id, "could not record failure");
                }
                let _ = tx
                    .send(BatchEvent::warning(format!(
                        "✗ {}: {}",
                        truncate(&item.title, 40),
                        truncate(&error, 200)
                    )))
                    .await;
                ItemResult::Failed
            }
            ItemOutcome::Restricted { reason } => {
                if let Err(e) =
                    tracker.mark_restricted(&item.id, &item.title, &item.url, &reason)
                {
                    tracing::warn!(error = %e, id = %item.id, "could not record restriction");
                }
                let _ = tx
                    .send(BatchEvent::warning(format!(
                        "✗ {} (restricted): {}",
                        truncate(&item.title, 40),
                        truncate(&reason, 200)
                    )))
                    .await;
                ItemResult::Failed
            }
        };

        // Fixed inter-item delay to rate-limit remote sources; videos get
        // a longer cool-down.
        tokio::time::sleep(self.config.download_delay).await;
        if item.asset_type == AssetType::Video {
            tokio::time::sleep(self.config.video_delay).await;
        }

        item_result
    }

    /// `base_dir/category[/subcategory]/sanitized_title`.
    fn destination_dir(&self, item: &ContentItem) -> PathBuf {
        let mut dir = self.settings.download_dir().join(&item.category);
        if !item.subcategory.is_empty() {
            dir = dir.join(sanitize_filename(&item.subcategory));
        }
        dir.join(sanitize_filename(&item.title))
    }
}

/// Bridge adapter progress strings into `Status` events.
fn progress_forwarder(
    tx: mpsc::Sender<BatchEvent>,
) -> (ProgressSink, tokio::task::JoinHandle<()>) {
    let (ptx, mut prx) = mpsc::channel::<String>(32);
    let handle = tokio::spawn(async move {
        while let Some(message) = prx.recv().await {
            let _ = tx.send(BatchEvent::Status { message }).await;
        }
    });
    (ProgressSink::new(ptx), handle)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 40), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "hé");
    }
}
