//! Modsync: directory synchronization against a remote reference archive.
//!
//! Fetches a zip snapshot of the reference tree, computes a content-hash diff
//! against a local directory and applies it, with optional backup of the
//! local tree beforehand.

pub mod apply;
pub mod backup;
pub mod cancel;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod progress;
pub mod scan;
pub mod session;
pub mod types;
