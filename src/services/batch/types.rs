//! Batch operation types and events.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::Settings;
use crate::models::{ContentItem, DownloadSummary};
use crate::services::sync::SourceDetail;

/// Events emitted during batch operations.
///
/// `Complete` and `Error` are the only terminal events; consumers stop
/// listening on either. `Keepalive` is injected by the event stream when
/// nothing has happened within the heartbeat interval.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Routine per-item state message.
    Status { message: String },
    /// Numeric progress through the batch.
    Progress {
        current: usize,
        total: usize,
        percent: f64,
        message: String,
    },
    /// Informational message (source headers, sync counts).
    Info { message: String },
    /// Per-item failure; never terminal.
    Warning { message: String },
    /// A source or pass finished well.
    Success { message: String },
    /// Terminal: the whole session is meaningless.
    Error { message: String },
    /// Terminal: batch finished (individual items may still have failed).
    Complete {
        message: String,
        folder: String,
        stats: DownloadSummary,
    },
    /// Idle heartbeat for long-lived listeners.
    Keepalive,
}

impl BatchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }
}

/// Policy values for batch execution.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Pause between items.
    pub download_delay: Duration,
    /// Extra pause after video downloads.
    pub video_delay: Duration,
    /// A source with zero successes for longer than this is abandoned for
    /// the pass and queued for one retry.
    pub stall_window: Duration,
    /// Consecutive failures (with zero successes) beyond this count trip
    /// the circuit breaker for the source.
    pub error_burst_threshold: usize,
    /// Idle interval before the event stream emits a keepalive.
    pub keepalive_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            download_delay: Duration::from_secs(1),
            video_delay: Duration::from_secs(3),
            stall_window: Duration::from_secs(60),
            error_burst_threshold: 3,
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

impl BatchConfig {
    /// Batch policy with the rate-limit delays taken from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            download_delay: Duration::from_secs(settings.download_delay_secs),
            video_delay: Duration::from_secs(settings.video_delay_secs),
            ..Self::default()
        }
    }
}

/// Counters accumulated over one batch pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Why a source was abandoned during a multi-source pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// No successful download within the stall window.
    Stalled,
    /// Too many consecutive failures with zero successes.
    ErrorBurst,
}

impl AbandonReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stalled => "stalled",
            Self::ErrorBurst => "error burst",
        }
    }
}

/// Outcome of downloading one source's new items within a pass.
#[derive(Debug, Clone, Default)]
pub struct SourcePassOutcome {
    pub downloaded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub abandoned: Option<AbandonReason>,
}

/// Final result of a sync-all run, one detail row per source.
#[derive(Debug, Clone, Default)]
pub struct SyncAllResult {
    pub sources_checked: usize,
    pub total_downloaded: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
    pub details: Vec<SourceDetail>,
    /// Sources that were abandoned and still failed after the retry pass.
    pub failed_sources: Vec<String>,
}

/// Session-scoped index of the most recent indexing pass, keyed by item
/// id. Replaced wholesale on every new indexing run; nothing ambient.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    items: HashMap<String, ContentItem>,
}

impl IndexSnapshot {
    pub fn from_items(items: Vec<ContentItem>) -> Self {
        Self {
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ContentItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(BatchEvent::Error {
            message: "x".into()
        }
        .is_terminal());
        assert!(BatchEvent::Complete {
            message: "x".into(),
            folder: "/tmp".into(),
            stats: DownloadSummary::default(),
        }
        .is_terminal());
        assert!(!BatchEvent::Keepalive.is_terminal());
        assert!(!BatchEvent::warning("x").is_terminal());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_string(&BatchEvent::status("hi")).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        let json = serde_json::to_string(&BatchEvent::Keepalive).unwrap();
        assert!(json.contains("\"type\":\"keepalive\""));
    }

    #[test]
    fn test_config_delays_come_from_settings() {
        let settings = Settings {
            download_delay_secs: 5,
            video_delay_secs: 9,
            ..Default::default()
        };
        let config = BatchConfig::from_settings(&settings);
        assert_eq!(config.download_delay, Duration::from_secs(5));
        assert_eq!(config.video_delay, Duration::from_secs(9));
        assert_eq!(config.error_burst_threshold, 3);
        assert_eq!(config.stall_window, Duration::from_secs(60));
    }

    #[test]
    fn test_snapshot_lookup() {
        use crate::models::AssetType;
        let snapshot = IndexSnapshot::from_items(vec![ContentItem::new(
            "a1",
            "T",
            "u",
            AssetType::Audio,
            "podcast",
        )]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("a1").is_some());
        assert!(snapshot.get("zz").is_none());
    }
}
