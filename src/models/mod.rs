//! Data models for Crawlavator.

mod content;
mod manifest;

pub use content::{slugify, AssetType, ContentItem};
pub use manifest::{
    AccessLog, AccessRecord, DownloadEntry, DownloadStatus, DownloadSummary, Manifest,
};
