//! Manifest and access-log models for download tracking.
//!
//! The manifest is the durable record of per-item download status for a
//! base directory. The access log is an append-only audit trail of
//! accessible, restricted, and errored access attempts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AssetType;

/// Per-item download state.
///
/// `Unknown` absorbs unrecognized values from older manifest files so a
/// legacy manifest still loads; such entries count toward totals only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Partial,
    Complete,
    Failed,
    Restricted,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Partial => "partial",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Restricted => "restricted",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal states that must never be retried automatically.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Restricted)
    }
}

/// Mutable record of one item's retrieval history, keyed by item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub asset_type: String,
    pub category: String,
    pub status: DownloadStatus,
    pub local_path: Option<String>,
    pub size: Option<u64>,
    pub expected_size: Option<u64>,
    pub resume_position: Option<u64>,
    pub checksum: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl DownloadEntry {
    /// Create a fresh in-progress entry.
    pub fn started(
        id: &str,
        title: &str,
        url: &str,
        asset_type: AssetType,
        category: &str,
        local_path: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            asset_type: asset_type.as_str().to_string(),
            category: category.to_string(),
            status: DownloadStatus::InProgress,
            local_path: Some(local_path.to_string()),
            size: None,
            expected_size: None,
            resume_position: None,
            checksum: None,
            downloaded_at: None,
            error: None,
        }
    }
}

/// Durable per-id download-status document for a base directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub downloads: BTreeMap<String, DownloadEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_sync: None,
            downloads: BTreeMap::new(),
        }
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// One timestamped access-attempt record. Never mutated, only appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log of access attempts, independent of the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessLog {
    pub accessible: Vec<AccessRecord>,
    pub restricted: Vec<AccessRecord>,
    pub errors: Vec<AccessRecord>,
}

/// Per-status counts over a manifest, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub total: usize,
    pub complete: usize,
    pub partial: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub restricted: usize,
    pub pending: usize,
    pub skipped: usize,
}

impl DownloadSummary {
    /// Count every entry exactly once; unknown statuses only add to total.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut summary = Self::default();
        for entry in manifest.downloads.values() {
            summary.total += 1;
            match entry.status {
                DownloadStatus::Complete => summary.complete += 1,
                DownloadStatus::Partial => summary.partial += 1,
                DownloadStatus::InProgress => summary.in_progress += 1,
                DownloadStatus::Failed => summary.failed += 1,
                DownloadStatus::Restricted => summary.restricted += 1,
                DownloadStatus::Pending => summary.pending += 1,
                DownloadStatus::Skipped => summary.skipped += 1,
                DownloadStatus::Unknown => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&DownloadStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let status: DownloadStatus = serde_json::from_str("\"restricted\"").unwrap();
        assert_eq!(status, DownloadStatus::Restricted);
    }

    #[test]
    fn test_unknown_status_tolerated() {
        let status: DownloadStatus = serde_json::from_str("\"archived_v1\"").unwrap();
        assert_eq!(status, DownloadStatus::Unknown);
    }

    #[test]
    fn test_summary_counts_unknown_in_total_only() {
        let mut manifest = Manifest::new();
        let mut entry = DownloadEntry::started(
            "a1",
            "Title",
            "http://example.com",
            AssetType::Audio,
            "podcast",
            "/tmp/a1.mp3",
        );
        entry.status = DownloadStatus::Unknown;
        manifest.downloads.insert("a1".to_string(), entry);

        let summary = DownloadSummary::from_manifest(&manifest);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.complete, 0);
        assert_eq!(summary.failed, 0);
    }
}
