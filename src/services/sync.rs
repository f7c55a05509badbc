//! Sync: diff a freshly indexed remote item list against local holdings.
//!
//! Local presence is decided by OR-combining two independent signals: the
//! manifest's completed entries and a filesystem scan that recovers
//! candidate ids from filenames. The filename heuristic is deliberately
//! permissive; with large media the cheap mistake is re-downloading, so it
//! biases toward treating a plausible match as already-present.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::models::{ContentItem, Manifest};
use crate::utils::fs::tail_lines;

const SYNC_LOG_FILE: &str = "sync_log.jsonl";
const AUDIO_EXTENSIONS: [&str; 4] = [".mp3", ".m4a", ".wav", ".mp4"];
const TRANSCRIPT_SUFFIX: &str = "_transcript.txt";

/// Abbreviated item reference for sync previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewItem {
    pub id: String,
    pub title: String,
}

/// Result of syncing one source against local state.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub source: String,
    pub source_name: String,
    pub indexed: usize,
    pub local: usize,
    pub new: usize,
    /// First 10 new items, id and title only.
    pub preview: Vec<PreviewItem>,
    /// Complete new-item list, in indexing order, for the batch runner.
    pub new_items: Vec<ContentItem>,
}

/// Per-source breakdown inside a sync log record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDetail {
    pub source: String,
    pub indexed: usize,
    pub local: usize,
    pub new_available: usize,
    pub downloaded: usize,
    pub download_errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One record in the append-only sync operation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub search_directory: String,
    pub sources_checked: usize,
    pub total_downloaded: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
    pub duration_seconds: f64,
    pub source_details: Vec<SourceDetail>,
}

/// Computes new-item deltas and maintains the sync operation log.
pub struct SyncService {
    base_dir: PathBuf,
    sync_log_path: PathBuf,
}

impl SyncService {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let sync_log_path = base_dir.join(SYNC_LOG_FILE);
        Self {
            base_dir,
            sync_log_path,
        }
    }

    /// Find content ids already present locally for a source.
    ///
    /// Combines the manifest's completed entries (filtered by id prefix)
    /// with a recursive filename scan of `search_dir` (defaults to the
    /// base directory).
    pub fn find_local_content(&self, source_id: &str, search_dir: Option<&Path>) -> HashSet<String> {
        let mut local_ids = self.manifest_completed_ids(source_id);

        let search_dir = search_dir.unwrap_or(&self.base_dir);
        if !search_dir.exists() {
            return local_ids;
        }

        tracing::info!(dir = %search_dir.display(), source = source_id, "scanning for local content");

        // Transcript-derived ids are stronger evidence than audio-derived
        // ones; when one episode has both files it must count once.
        let mut transcript_ids: HashSet<String> = HashSet::new();
        let mut audio_ids: HashSet<String> = HashSet::new();

        let needle = source_id.to_lowercase().replace('_', "");

        for entry in WalkDir::new(search_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            let file_lower = file_name.to_lowercase();
            if !file_lower.replace('_', "").contains(&needle) {
                continue;
            }

            if let Some(base) = file_name.strip_suffix(TRANSCRIPT_SUFFIX) {
                if let Some(id) = candidate_id(base) {
                    transcript_ids.insert(id.clone());
                    local_ids.insert(id);
                }
            } else if let Some(base) = strip_audio_extension(&file_lower, file_name) {
                if let Some(id) = candidate_id(base) {
                    audio_ids.insert(id.clone());
                    if !transcript_ids.contains(&id) {
                        local_ids.insert(id);
                    }
                }
            }
        }

        tracing::info!(
            transcripts = transcript_ids.len(),
            audio = audio_ids.len(),
            total = local_ids.len(),
            source = source_id,
            "local content scan finished"
        );
        local_ids
    }

    /// Items in `indexed` whose id is not in `local_ids`, original order.
    pub fn compare_with_remote(
        &self,
        indexed: &[ContentItem],
        local_ids: &HashSet<String>,
    ) -> Vec<ContentItem> {
        indexed
            .iter()
            .filter(|item| !local_ids.contains(&item.id))
            .cloned()
            .collect()
    }

    /// Sync a single source: discover local holdings and compute the delta.
    pub fn sync_source(
        &self,
        source_id: &str,
        source_name: &str,
        indexed: &[ContentItem],
        search_dir: Option<&Path>,
    ) -> SyncReport {
        let local_ids = self.find_local_content(source_id, search_dir);
        let new_items = self.compare_with_remote(indexed, &local_ids);

        SyncReport {
            source: source_id.to_string(),
            source_name: source_name.to_string(),
            indexed: indexed.len(),
            local: local_ids.len(),
            new: new_items.len(),
            preview: new_items
                .iter()
                .take(10)
                .map(|item| PreviewItem {
                    id: item.id.clone(),
                    title: item.title.clone(),
                })
                .collect(),
            new_items,
        }
    }

    /// Append one record to the NDJSON sync log.
    pub fn log_sync_operation(&self, record: &SyncLogRecord) -> anyhow::Result<()> {
        use std::io::Write;

        std::fs::create_dir_all(&self.base_dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.sync_log_path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Last `limit` sync log records, oldest first. Unparseable lines are
    /// skipped.
    pub fn recent_logs(&self, limit: usize) -> anyhow::Result<Vec<SyncLogRecord>> {
        let lines = tail_lines(&self.sync_log_path, limit)?;
        Ok(lines
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    fn manifest_completed_ids(&self, source_id: &str) -> HashSet<String> {
        let manifest_path = self.base_dir.join("manifest.json");
        let Ok(raw) = std::fs::read_to_string(&manifest_path) else {
            return HashSet::new();
        };
        match serde_json::from_str::<Manifest>(&raw) {
            Ok(manifest) => manifest
                .downloads
                .iter()
                .filter(|(id, entry)| {
                    entry.status == crate::models::DownloadStatus::Complete
                        && id.starts_with(source_id)
                })
                .map(|(id, _)| id.clone())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read manifest for sync");
                HashSet::new()
            }
        }
    }
}

/// Derive a candidate content id from a filename stem: take the first
/// three underscore tokens (two if only two exist). Short results are
/// rejected as noise.
fn candidate_id(base_name: &str) -> Option<String> {
    let parts: Vec<&str> = base_name.split('_').collect();
    if parts.len() < 2 {
        return None;
    }
    let take = if parts.len() >= 3 { 3 } else { 2 };
    let id = parts[..take].join("_");
    if id.len() > 3 {
        Some(id)
    } else {
        None
    }
}

fn strip_audio_extension<'a>(file_lower: &str, file_name: &'a str) -> Option<&'a str> {
    for ext in AUDIO_EXTENSIONS {
        if file_lower.ends_with(ext) {
            return Some(&file_name[..file_name.len() - ext.len()]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetType;

    fn item(id: &str) -> ContentItem {
        ContentItem::new(id, format!("Title {id}"), "http://x", AssetType::Audio, "podcast")
    }

    #[test]
    fn test_compare_with_remote_preserves_order() {
        let service = SyncService::new("/tmp/nonexistent-sync-base");
        let indexed = vec![item("a"), item("b"), item("c"), item("d")];
        let local: HashSet<String> = ["b", "d"].iter().map(|s| s.to_string()).collect();

        let new_items = service.compare_with_remote(&indexed, &local);
        let ids: Vec<_> = new_items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_compare_with_remote_empty_local() {
        let service = SyncService::new("/tmp/nonexistent-sync-base");
        let indexed = vec![item("a"), item("b")];
        let new_items = service.compare_with_remote(&indexed, &HashSet::new());
        assert_eq!(new_items.len(), 2);
    }

    #[test]
    fn test_candidate_id_tokenization() {
        assert_eq!(candidate_id("lex_412_jane_doe"), Some("lex_412_jane".to_string()));
        assert_eq!(candidate_id("lex_intro"), Some("lex_intro".to_string()));
        assert_eq!(candidate_id("single"), None);
        assert_eq!(candidate_id("a_b"), None); // too short to be meaningful
    }

    #[test]
    fn test_find_local_prefers_transcript_over_audio() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("archive/podcast");
        std::fs::create_dir_all(&sub).unwrap();
        // Same logical episode, two artifacts.
        std::fs::write(sub.join("lex_412_jane_doe_transcript.txt"), b"t").unwrap();
        std::fs::write(sub.join("lex_412_jane_doe.mp3"), b"a").unwrap();
        // Audio only.
        std::fs::write(sub.join("lex_300_other_guest.m4a"), b"a").unwrap();
        // Unrelated source.
        std::fs::write(sub.join("rss_feed_episode.mp3"), b"a").unwrap();

        let service = SyncService::new(dir.path());
        let local = service.find_local_content("lex", Some(dir.path()));
        assert!(local.contains("lex_412_jane"));
        assert!(local.contains("lex_300_other"));
        assert!(!local.iter().any(|id| id.starts_with("rss")));
        assert_eq!(local.len(), 2);
    }

    #[test]
    fn test_find_local_includes_manifest_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = crate::services::DownloadTracker::new(dir.path()).unwrap();
        let file = dir.path().join("done.txt");
        std::fs::write(&file, vec![0u8; 2048]).unwrap();
        tracker
            .complete_download("lex_77_done", file.to_str().unwrap(), 2048, None)
            .unwrap();
        tracker
            .start_download("lex_78_wip", "T", "u", AssetType::Transcript, "podcast", "p")
            .unwrap();

        let service = SyncService::new(dir.path());
        let empty = dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let local = service.find_local_content("lex", Some(&empty));
        assert!(local.contains("lex_77_done"));
        assert!(!local.contains("lex_78_wip"));
    }

    #[test]
    fn test_sync_source_preview_limited_to_ten() {
        let dir = tempfile::tempdir().unwrap();
        let service = SyncService::new(dir.path());
        let indexed: Vec<ContentItem> = (0..15).map(|i| item(&format!("src_{i:02}_x"))).collect();

        let report = service.sync_source("src", "Source", &indexed, Some(dir.path()));
        assert_eq!(report.indexed, 15);
        assert_eq!(report.new, 15);
        assert_eq!(report.preview.len(), 10);
        assert_eq!(report.new_items.len(), 15);
    }

    #[test]
    fn test_sync_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let service = SyncService::new(dir.path());

        for i in 0..5 {
            service
                .log_sync_operation(&SyncLogRecord {
                    timestamp: Utc::now(),
                    operation: "sync_all".to_string(),
                    search_directory: "/data".to_string(),
                    sources_checked: i,
                    total_downloaded: i,
                    total_skipped: 0,
                    total_errors: 0,
                    duration_seconds: 1.5,
                    source_details: vec![SourceDetail {
                        source: "lex".to_string(),
                        indexed: 10,
                        local: 8,
                        new_available: 2,
                        downloaded: i,
                        download_errors: 0,
                        error: None,
                    }],
                })
                .unwrap();
        }

        let logs = service.recent_logs(2).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].sources_checked, 3);
        assert_eq!(logs[1].sources_checked, 4);
    }
}
