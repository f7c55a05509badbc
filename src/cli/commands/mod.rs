//! Command implementations.

pub mod auth;
pub mod download;
pub mod index;
pub mod logs;
pub mod sites;
pub mod status;
pub mod sync;
