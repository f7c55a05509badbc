//! Download tracking: manifest state machine and access log.
//!
//! The tracker is the single source of truth for "has this id been durably
//! retrieved" within one base directory. Every state-changing operation
//! persists the manifest immediately, except high-frequency progress ticks
//! which are batched to bound write amplification on large transfers.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::models::{
    AccessLog, AccessRecord, AssetType, DownloadEntry, DownloadStatus, DownloadSummary, Manifest,
};
use crate::utils::fs::write_json_atomic;

/// Completed downloads within this fraction of the expected size are
/// accepted; minor transcoding/measurement variance is not a re-download.
const SIZE_TOLERANCE: f64 = 0.98;

/// Persist progress every Nth tick. Downloads are strictly sequential per
/// tracker, so a single tracker-wide counter suffices.
const PROGRESS_FLUSH_INTERVAL: u32 = 25;

const MANIFEST_FILE: &str = "manifest.json";
const ACCESS_LOG_FILE: &str = "access_log.json";

/// Manages download tracking, resume positions, and the manifest file.
pub struct DownloadTracker {
    base_dir: PathBuf,
    manifest_path: PathBuf,
    access_log_path: PathBuf,
    manifest: Manifest,
    access_log: AccessLog,
    progress_ticks: u32,
}

impl DownloadTracker {
    /// Open (or create) the tracker for a base directory.
    ///
    /// A corrupt or missing manifest is treated as "start fresh", never
    /// fatal.
    pub fn new(base_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;

        let manifest_path = base_dir.join(MANIFEST_FILE);
        let access_log_path = base_dir.join(ACCESS_LOG_FILE);

        let manifest = load_or_default(&manifest_path, Manifest::new);
        let access_log = load_or_default(&access_log_path, AccessLog::default);

        Ok(Self {
            base_dir,
            manifest_path,
            access_log_path,
            manifest,
            access_log,
            progress_ticks: 0,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the recorded status entry for an item.
    pub fn status(&self, item_id: &str) -> Option<&DownloadEntry> {
        self.manifest.downloads.get(item_id)
    }

    /// The central decision gate: should this item be (re)downloaded?
    ///
    /// Returns false when the item is durably complete (file still on disk
    /// and size within tolerance of the expected size, when known) or in a
    /// terminal failure state. Must be consulted before every attempt and
    /// never cached across a session.
    pub fn should_download(&self, item_id: &str, expected_size: Option<u64>) -> bool {
        let Some(entry) = self.manifest.downloads.get(item_id) else {
            return true;
        };

        if entry.status == DownloadStatus::Complete {
            let file_exists = entry
                .local_path
                .as_deref()
                .map(|p| Path::new(p).exists())
                .unwrap_or(false);
            if file_exists {
                match (expected_size, entry.size) {
                    (Some(expected), Some(size)) if expected > 0 => {
                        if size as f64 >= expected as f64 * SIZE_TOLERANCE {
                            return false;
                        }
                    }
                    (_, Some(size)) if size > 0 => return false,
                    _ => {}
                }
            }
            // File missing or undersized, needs re-download.
            return true;
        }

        if entry.status.is_terminal_failure() {
            return false;
        }

        true
    }

    /// Retry-pass variant of the gate: a prior `Failed` entry becomes
    /// eligible again. `Restricted` stays terminal, and complete entries
    /// are judged exactly as in [`Self::should_download`].
    pub fn should_retry(&self, item_id: &str, expected_size: Option<u64>) -> bool {
        match self.manifest.downloads.get(item_id) {
            Some(entry) if entry.status == DownloadStatus::Failed => true,
            _ => self.should_download(item_id, expected_size),
        }
    }

    /// Resume offset for a partial download, zero otherwise.
    pub fn resume_position(&self, item_id: &str) -> u64 {
        self.manifest
            .downloads
            .get(item_id)
            .filter(|e| e.status == DownloadStatus::Partial)
            .and_then(|e| e.resume_position)
            .unwrap_or(0)
    }

    /// Mark a download as started. Overwrites any prior entry.
    pub fn start_download(
        &mut self,
        item_id: &str,
        title: &str,
        url: &str,
        asset_type: AssetType,
        category: &str,
        local_path: &str,
    ) -> anyhow::Result<()> {
        let entry = DownloadEntry::started(item_id, title, url, asset_type, category, local_path);
        self.manifest.downloads.insert(item_id.to_string(), entry);
        self.save_manifest()
    }

    /// Record progress for resume capability.
    ///
    /// Persists only every [`PROGRESS_FLUSH_INTERVAL`]th tick; losing a few
    /// ticks on crash costs a re-fetch of the tail, not correctness.
    pub fn update_progress(&mut self, item_id: &str, bytes: u64, expected_size: Option<u64>) {
        let Some(entry) = self.manifest.downloads.get_mut(item_id) else {
            return;
        };
        entry.size = Some(bytes);
        entry.resume_position = Some(bytes);
        if expected_size.is_some() {
            entry.expected_size = expected_size;
        }
        entry.status = DownloadStatus::Partial;

        self.progress_ticks += 1;
        if self.progress_ticks % PROGRESS_FLUSH_INTERVAL == 0 {
            if let Err(e) = self.save_manifest() {
                tracing::warn!(error = %e, "deferred progress flush failed");
            }
        }
    }

    /// Mark a download as complete. Synthesizes an entry if the adapter
    /// never called `start_download`.
    pub fn complete_download(
        &mut self,
        item_id: &str,
        local_path: &str,
        size: u64,
        checksum: Option<String>,
    ) -> anyhow::Result<()> {
        match self.manifest.downloads.get_mut(item_id) {
            Some(entry) => {
                entry.status = DownloadStatus::Complete;
                entry.local_path = Some(local_path.to_string());
                entry.size = Some(size);
                entry.checksum = checksum;
                entry.downloaded_at = Some(Utc::now());
                entry.error = None;
            }
            None => {
                let mut entry = DownloadEntry::started(
                    item_id, item_id, "", AssetType::Audio, "unknown", local_path,
                );
                entry.asset_type = "unknown".to_string();
                entry.status = DownloadStatus::Complete;
                entry.size = Some(size);
                entry.checksum = checksum;
                entry.downloaded_at = Some(Utc::now());
                self.manifest.downloads.insert(item_id.to_string(), entry);
            }
        }
        self.save_manifest()
    }

    /// Mark a download as failed and log the error for auditing.
    pub fn fail_download(&mut self, item_id: &str, error: &str) -> anyhow::Result<()> {
        if let Some(entry) = self.manifest.downloads.get_mut(item_id) {
            entry.status = DownloadStatus::Failed;
            entry.error = Some(error.to_string());
            self.save_manifest()?;
        }

        self.access_log.errors.push(AccessRecord {
            id: Some(item_id.to_string()),
            title: None,
            url: None,
            reason: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        });
        self.save_access_log()
    }

    /// Mark content as restricted (access denied).
    ///
    /// Restricted is terminal: the decision gate never retries it. Kept
    /// separate from generic failure so denied content can be audited over
    /// time.
    pub fn mark_restricted(
        &mut self,
        item_id: &str,
        title: &str,
        url: &str,
        reason: &str,
    ) -> anyhow::Result<()> {
        match self.manifest.downloads.get_mut(item_id) {
            Some(entry) => {
                entry.status = DownloadStatus::Restricted;
                entry.error = Some(reason.to_string());
            }
            None => {
                let mut entry =
                    DownloadEntry::started(item_id, title, url, AssetType::Audio, "unknown", "");
                entry.asset_type = "unknown".to_string();
                entry.local_path = None;
                entry.status = DownloadStatus::Restricted;
                entry.error = Some(reason.to_string());
                self.manifest.downloads.insert(item_id.to_string(), entry);
            }
        }
        self.save_manifest()?;

        self.access_log.restricted.push(AccessRecord {
            id: Some(item_id.to_string()),
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            reason: Some(reason.to_string()),
            error: None,
            timestamp: Utc::now(),
        });
        self.save_access_log()
    }

    /// Log successful access to content (flushed by the next `save`).
    pub fn mark_accessible(&mut self, url: &str, title: &str) {
        self.access_log.accessible.push(AccessRecord {
            id: None,
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            reason: None,
            error: None,
            timestamp: Utc::now(),
        });
    }

    /// Per-status counts for reporting.
    pub fn summary(&self) -> DownloadSummary {
        DownloadSummary::from_manifest(&self.manifest)
    }

    /// Completed item ids whose id starts with `prefix`.
    pub fn completed_ids_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.manifest
            .downloads
            .iter()
            .filter(|(id, e)| e.status == DownloadStatus::Complete && id.starts_with(prefix))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Streaming SHA-256 of a file, prefixed `sha256:`. Opt-in; not run on
    /// every completion.
    pub fn calculate_checksum(path: &Path) -> anyhow::Result<String> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// Explicitly persist both manifest and access log.
    pub fn save(&mut self) -> anyhow::Result<()> {
        self.save_manifest()?;
        self.save_access_log()
    }

    fn save_manifest(&mut self) -> anyhow::Result<()> {
        self.manifest.last_sync = Some(Utc::now());
        write_json_atomic(&self.manifest_path, &self.manifest)
    }

    fn save_access_log(&self) -> anyhow::Result<()> {
        write_json_atomic(&self.access_log_path, &self.access_log)
    }
}

fn load_or_default<T, F>(path: &Path, default: F) -> T
where
    T: serde::de::DeserializeOwned,
    F: FnOnce() -> T,
{
    if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => return value,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt state file, starting fresh");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable state file, starting fresh");
            }
        }
    }
    default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &Path) -> DownloadTracker {
        DownloadTracker::new(dir).unwrap()
    }

    fn touch(path: &Path, bytes: usize) {
        std::fs::write(path, vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_fresh_download_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let file = dir.path().join("a1.mp3");

        assert!(t.should_download("a1", None));

        t.start_download(
            "a1",
            "Episode One",
            "http://example.com/a1",
            AssetType::Audio,
            "podcast",
            file.to_str().unwrap(),
        )
        .unwrap();
        touch(&file, 50_000);
        t.complete_download("a1", file.to_str().unwrap(), 50_000, None)
            .unwrap();

        assert!(!t.should_download("a1", None));
        let summary = t.summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.complete, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.partial, 0);
    }

    #[test]
    fn test_complete_but_missing_file_invalidated() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let ghost = dir.path().join("gone.mp3");

        t.complete_download("a1", ghost.to_str().unwrap(), 1000, None)
            .unwrap();
        assert!(t.should_download("a1", None));
    }

    #[test]
    fn test_size_tolerance_band() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let file = dir.path().join("v.mp4");
        touch(&file, 10);

        // 98.5% of expected: inside the tolerance band, no re-download.
        t.complete_download("v1", file.to_str().unwrap(), 98_500, None)
            .unwrap();
        assert!(!t.should_download("v1", Some(100_000)));

        // 90% of expected: outside the band, re-download.
        t.complete_download("v2", file.to_str().unwrap(), 90_000, None)
            .unwrap();
        assert!(t.should_download("v2", Some(100_000)));
    }

    #[test]
    fn test_failed_and_restricted_never_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());

        t.start_download("f1", "T", "http://x", AssetType::Pdf, "docs", "/tmp/f1.pdf")
            .unwrap();
        t.fail_download("f1", "timeout").unwrap();
        assert!(!t.should_download("f1", None));

        t.mark_restricted("b2", "Title", "http://x", "403").unwrap();
        assert!(!t.should_download("b2", None));
        assert!(!t.should_download("b2", None));
    }

    #[test]
    fn test_retry_gate_readmits_failed_but_not_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let file = dir.path().join("done.mp3");
        touch(&file, 2048);

        t.start_download("f1", "T", "http://x", AssetType::Audio, "podcast", "p")
            .unwrap();
        t.fail_download("f1", "timeout").unwrap();
        t.mark_restricted("b2", "Title", "http://x", "403").unwrap();
        t.complete_download("c3", file.to_str().unwrap(), 2048, None)
            .unwrap();

        assert!(!t.should_download("f1", None));
        assert!(t.should_retry("f1", None));
        assert!(!t.should_retry("b2", None));
        assert!(!t.should_retry("c3", None));
        assert!(t.should_retry("never_seen", None));
    }

    #[test]
    fn test_restricted_survives_manifest_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut t = tracker(dir.path());
            t.mark_restricted("b2", "Title", "http://x", "403").unwrap();
        }
        let t = tracker(dir.path());
        assert!(!t.should_download("b2", None));
        assert_eq!(
            t.status("b2").unwrap().status,
            DownloadStatus::Restricted
        );
    }

    #[test]
    fn test_complete_synthesizes_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let file = dir.path().join("late.bin");
        touch(&file, 2048);

        t.complete_download("late1", file.to_str().unwrap(), 2048, None)
            .unwrap();
        let entry = t.status("late1").unwrap();
        assert_eq!(entry.status, DownloadStatus::Complete);
        assert_eq!(entry.asset_type, "unknown");
    }

    #[test]
    fn test_progress_sets_partial_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        t.start_download("p1", "T", "http://x", AssetType::Video, "videos", "/tmp/p1.mp4")
            .unwrap();
        t.update_progress("p1", 12_345, Some(100_000));

        let entry = t.status("p1").unwrap();
        assert_eq!(entry.status, DownloadStatus::Partial);
        assert_eq!(entry.resume_position, Some(12_345));
        assert_eq!(entry.expected_size, Some(100_000));
        assert_eq!(t.resume_position("p1"), 12_345);
        // Partial entries are still eligible.
        assert!(t.should_download("p1", None));
    }

    #[test]
    fn test_corrupt_manifest_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        let t = tracker(dir.path());
        assert_eq!(t.summary().total, 0);
    }

    #[test]
    fn test_access_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        t.mark_restricted("r1", "A", "http://a", "403").unwrap();
        t.fail_download("r1", "still denied").unwrap();
        t.mark_accessible("http://b", "B");
        t.save().unwrap();

        let raw = std::fs::read_to_string(dir.path().join(ACCESS_LOG_FILE)).unwrap();
        let log: AccessLog = serde_json::from_str(&raw).unwrap();
        assert_eq!(log.restricted.len(), 1);
        assert_eq!(log.errors.len(), 1);
        assert_eq!(log.accessible.len(), 1);
    }

    #[test]
    fn test_checksum_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("c.bin");
        std::fs::write(&file, b"hello").unwrap();
        let sum = DownloadTracker::calculate_checksum(&file).unwrap();
        assert_eq!(
            sum,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_completed_ids_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tracker(dir.path());
        let file = dir.path().join("x.txt");
        touch(&file, 2048);

        t.complete_download("lex_1_a", file.to_str().unwrap(), 10, None)
            .unwrap();
        t.complete_download("rss_feed_b", file.to_str().unwrap(), 10, None)
            .unwrap();
        t.start_download("lex_2_c", "T", "u", AssetType::Transcript, "podcast", "p")
            .unwrap();

        let ids = t.completed_ids_with_prefix("lex");
        assert_eq!(ids, vec!["lex_1_a".to_string()]);
    }
}
