//! Directory scanning: builds a [`PathMap`] snapshot of a tree.

pub mod filter;
pub mod hasher;
pub mod path;

use crate::error::SyncError;
use crate::types::{ItemOutcome, PathEntry, PathMap};
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Result of scanning one tree: the snapshot plus per-item outcomes for
/// files that could not be hashed. Unreadable files stay in the map with an
/// empty hash so the diff still sees the path (and schedules a replacement
/// when the reference has readable content for it).
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub map: PathMap,
    pub failures: Vec<ItemOutcome>,
}

/// Recursive tree scanner with optional noise filtering.
///
/// Filtering is only ever enabled for the live/mod side; reference-side
/// scans take the extracted snapshot as-is.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
    filter_garbage: bool,
}

impl DirectoryScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            filter_garbage: false,
        }
    }

    pub fn filter_garbage(mut self, enabled: bool) -> Self {
        self.filter_garbage = enabled;
        self
    }

    /// Walk the tree and build the snapshot. Walk errors are terminal; hash
    /// errors are soft and land in [`ScanReport::failures`].
    pub fn scan(&self) -> Result<ScanReport, SyncError> {
        let root = path::canonical_root(&self.root)
            .map_err(|e| SyncError::fs(format!("failed to scan {}", self.root.display()), e))?;

        let mut map = PathMap::new();
        let mut failures = Vec::new();
        let filter_garbage = self.filter_garbage;

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 || !filter_garbage {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    !filter::is_garbage_dir(&name)
                } else {
                    !filter::is_garbage_file(&name)
                }
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                SyncError::fs(
                    format!("failed to scan {}", root.display()),
                    std::io::Error::new(std::io::ErrorKind::Other, e),
                )
            })?;
            if entry.depth() == 0 {
                continue;
            }
            let Some(key) = path::rel_key(&root, entry.path()) else {
                continue;
            };

            if entry.file_type().is_dir() {
                map.insert(key.clone(), PathEntry::dir(key));
            } else if entry.file_type().is_file() {
                let content_hash = match hasher::hash_file(entry.path()) {
                    Ok(digest) => Some(digest),
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "hashing failed");
                        failures.push(ItemOutcome::failed(key.clone(), e.to_string()));
                        None
                    }
                };
                map.insert(key.clone(), PathEntry::file(key, content_hash));
            }
            // Symlinks are neither followed nor recorded.
        }

        debug!(
            root = %root.display(),
            entries = map.len(),
            failures = failures.len(),
            "scan complete"
        );
        Ok(ScanReport { map, failures })
    }
}
