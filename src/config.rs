//! Configuration management for Crawlavator.
//!
//! Settings load from a TOML file (`--config` path or the platform config
//! directory), with environment overrides for the download directory.
//! A missing file yields defaults; a malformed file is an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default seconds between items in a batch.
pub const DEFAULT_DOWNLOAD_DELAY_SECS: u64 = 1;
/// Extra delay after heavy (video) downloads.
pub const DEFAULT_VIDEO_DELAY_SECS: u64 = 3;

/// One pre-authenticated private RSS feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Short identifier used in content ids (e.g. "samharris").
    pub id: String,
    /// Display name, used as the subcategory directory.
    pub name: String,
    /// Feed URL (tokens embedded, treat as a secret).
    pub url: String,
    #[serde(default)]
    pub author: String,
}

/// Credentials for a source that requires login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory that receives downloads, the manifest, and logs.
    pub download_dir: String,
    /// Directory scanned recursively when syncing against local holdings.
    /// Defaults to `download_dir` when empty.
    pub search_dir: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Seconds to wait between items.
    pub download_delay_secs: u64,
    /// Extra seconds to wait after video downloads.
    pub video_delay_secs: u64,
    /// Private RSS feeds for the `feeds` adapter.
    pub feeds: Vec<FeedConfig>,
    /// Per-source credentials, keyed by source id.
    pub credentials: HashMap<String, Credentials>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: "downloads".to_string(),
            search_dir: String::new(),
            request_timeout_secs: 60,
            download_delay_secs: DEFAULT_DOWNLOAD_DELAY_SECS,
            video_delay_secs: DEFAULT_VIDEO_DELAY_SECS,
            feeds: Vec::new(),
            credentials: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, or from the default location.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        } else {
            tracing::info!("no config file at {}, using defaults", path.display());
            Settings::default()
        };

        if let Ok(dir) = std::env::var("CRAWLAVATOR_DOWNLOAD_DIR") {
            if !dir.trim().is_empty() {
                settings.download_dir = dir;
            }
        }

        Ok(settings)
    }

    /// Absolute, `~`-expanded download directory.
    pub fn download_dir(&self) -> PathBuf {
        expand_path(&self.download_dir)
    }

    /// Absolute search directory for sync scans (falls back to download dir).
    pub fn search_dir(&self) -> PathBuf {
        if self.search_dir.trim().is_empty() {
            self.download_dir()
        } else {
            expand_path(&self.search_dir)
        }
    }

    pub fn credentials_for(&self, source_id: &str) -> Credentials {
        self.credentials.get(source_id).cloned().unwrap_or_default()
    }
}

/// Default config path: `<config_dir>/crawlavator/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crawlavator")
        .join("config.toml")
}

fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw.trim().trim_matches(|c| c == '\'' || c == '"'));
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.download_delay_secs, 1);
        assert_eq!(settings.video_delay_secs, 3);
        assert!(settings.feeds.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let raw = r#"
            download_dir = "~/archive"

            [[feeds]]
            id = "makingsense"
            name = "Making Sense"
            url = "https://example.com/private.rss"

            [credentials.edu]
            email = "user@example.com"
            password = "hunter2"
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.feeds.len(), 1);
        assert_eq!(settings.feeds[0].id, "makingsense");
        assert_eq!(settings.credentials_for("edu").email, "user@example.com");
        assert!(settings.credentials_for("missing").email.is_empty());
    }

    #[test]
    fn test_search_dir_falls_back_to_download_dir() {
        let settings = Settings {
            download_dir: "/data/archive".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.search_dir(), PathBuf::from("/data/archive"));
    }
}
