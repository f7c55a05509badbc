//! Crawlavator - batch content archiver.
//!
//! Indexes and downloads content (videos, articles, PDFs, audio,
//! transcripts) from pluggable site adapters, tracks retrieval state in a
//! durable manifest, and drives long-running batch operations with per-item
//! failure isolation.

pub mod cli;
pub mod config;
pub mod models;
pub mod services;
pub mod sites;
pub mod utils;
