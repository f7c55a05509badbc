//! Site adapters: pluggable indexing and downloading for one source each.
//!
//! The core treats adapters purely as injected capabilities behind the
//! [`SiteAdapter`] trait, selected at runtime from the registry by source
//! id. Adapter failures never escape as errors from `download_item`; they
//! are folded into [`ItemOutcome`] so the batch loop can route them.

pub mod feeds;
pub mod http;
pub mod lexfridman;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{Credentials, Settings};
use crate::models::ContentItem;

pub use http::SiteClient;

/// Errors raised by site plumbing, separated so access restrictions stay
/// distinguishable from transient failures all the way up the stack.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("access denied (403)")]
    Restricted,
    #[error("not found (404)")]
    NotFound,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Outcome of one item download attempt.
///
/// Explicit sum type instead of a bool-plus-message pair so failure
/// handling is visible in signatures.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Completed {
        local_path: PathBuf,
        size: u64,
        message: String,
    },
    Failed {
        error: String,
    },
    Restricted {
        reason: String,
    },
}

impl ItemOutcome {
    /// Fold a site error into an outcome, classifying restrictions.
    pub fn from_error(err: SiteError) -> Self {
        match err {
            SiteError::Restricted => Self::Restricted {
                reason: "Access denied (403)".to_string(),
            },
            other => Self::Failed {
                error: other.to_string(),
            },
        }
    }
}

/// Non-blocking progress message sink handed to adapters.
///
/// Adapters report coarse human-readable progress; sends never block and
/// are dropped if the consumer is gone or slow.
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<String>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards all messages.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(message.into());
        }
    }
}

/// Static description of a source.
#[derive(Debug, Clone)]
pub struct SiteMetadata {
    pub id: &'static str,
    pub name: &'static str,
    pub requires_auth: bool,
    pub asset_types: &'static [&'static str],
    pub categories: &'static [&'static str],
    /// Heavy sources (large media, slow endpoints) are processed last in
    /// multi-source batches.
    pub heavy: bool,
}

/// Pluggable backend implementing indexing and downloading for one source.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn metadata(&self) -> SiteMetadata;

    /// Check whether this source is ready to index (logged in, reachable).
    async fn check_auth(&self) -> (bool, String);

    /// Authenticate against the source. No-op for public sources.
    async fn login(&self, credentials: &Credentials) -> (bool, String);

    /// Discover all available content. Must assign the same id to
    /// logically-identical content across calls.
    async fn index_content(&self, progress: &ProgressSink) -> anyhow::Result<Vec<ContentItem>>;

    /// Fetch one item into `output_dir`. The adapter owns the concrete file
    /// layout inside the directory and any source-specific fallbacks.
    async fn download_item(
        &self,
        item: &ContentItem,
        output_dir: &Path,
        progress: &ProgressSink,
    ) -> ItemOutcome;
}

/// Runtime registry mapping source id to adapter.
#[derive(Default)]
pub struct SiteRegistry {
    adapters: BTreeMap<String, Arc<dyn SiteAdapter>>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry with all bundled adapters.
    pub fn with_builtin(settings: &Settings) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(lexfridman::LexFridmanSite::new(settings)?));
        registry.register(Arc::new(feeds::PrivateFeedsSite::new(settings)?));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn SiteAdapter>) {
        let id = adapter.metadata().id.to_string();
        self.adapters.insert(id, adapter);
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.get(source_id).cloned()
    }

    /// All adapters, light sources first, heavy sources last.
    pub fn ordered_for_batch(&self) -> Vec<Arc<dyn SiteAdapter>> {
        let mut adapters: Vec<_> = self.adapters.values().cloned().collect();
        adapters.sort_by_key(|a| a.metadata().heavy);
        adapters
    }

    pub fn list(&self) -> Vec<SiteMetadata> {
        self.adapters.values().map(|a| a.metadata()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_error() {
        assert!(matches!(
            ItemOutcome::from_error(SiteError::Restricted),
            ItemOutcome::Restricted { .. }
        ));
        assert!(matches!(
            ItemOutcome::from_error(SiteError::Status(500)),
            ItemOutcome::Failed { .. }
        ));
    }
}
