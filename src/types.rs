//! Shared data model for the scan/diff/apply pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single node in a scanned tree, keyed by its slash-normalized relative
/// path. `content_hash` is `None` for directories and for files whose content
/// could not be read (those are reported separately as [`ItemOutcome`]s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub rel_path: String,
    pub is_dir: bool,
    pub content_hash: Option<String>,
}

impl PathEntry {
    pub fn dir(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            is_dir: true,
            content_hash: None,
        }
    }

    pub fn file(rel_path: impl Into<String>, content_hash: Option<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            is_dir: false,
            content_hash,
        }
    }
}

/// Immutable snapshot of a tree at scan time. `BTreeMap` keeps iteration
/// deterministic, which the diff and apply ordering rely on.
pub type PathMap = BTreeMap<String, PathEntry>;

/// Per-item result for operations that must not abort the whole run on a
/// single bad entry (hashing during scan, deletions during apply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    Ok,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub rel_path: String,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn ok(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            status: ItemStatus::Ok,
        }
    }

    pub fn skipped(rel_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            status: ItemStatus::Skipped(reason.into()),
        }
    }

    pub fn failed(rel_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
            status: ItemStatus::Failed(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ItemStatus::Failed(_))
    }
}

/// Classification of two [`PathMap`]s. Buckets are mutually exclusive by key,
/// except that a path whose type differs between the two sides (directory on
/// one, file on the other) appears in both `deletions` and `additions` so
/// that apply converges the live tree to the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Present locally, absent from the reference. Live-side `is_dir` flag.
    pub deletions: Vec<PathEntry>,
    /// Present in the reference, absent locally. Reference-side flag.
    pub additions: Vec<PathEntry>,
    /// File in both with differing content hash. Reference-side entry.
    pub replacements: Vec<PathEntry>,
    /// Present in both and identical (or both directories).
    pub ignores: Vec<PathEntry>,
}

impl DiffResult {
    /// True when applying this diff would not touch the live tree.
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty() && self.additions.is_empty() && self.replacements.is_empty()
    }

    /// Number of items apply will process (phases 1 and 2 combined).
    pub fn work_items(&self) -> usize {
        self.deletions.len() + self.additions.len() + self.replacements.len()
    }
}
