//! Core services: download tracking, sync, and batch orchestration.

pub mod batch;
pub mod sync;
mod tracker;

pub use batch::{
    BatchConfig, BatchEvent, BatchRunner, EventStream, IndexSnapshot, SessionId, SessionRegistry,
};
pub use sync::{SyncLogRecord, SyncReport, SyncService};
pub use tracker::DownloadTracker;
