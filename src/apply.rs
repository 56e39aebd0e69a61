//! Applying a diff to the live tree.

use crate::backup::BackupArchiver;
use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::progress::Reporter;
use crate::types::{DiffResult, ItemOutcome, PathEntry};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Share of the progress window reserved for the optional pre-apply backup.
const BACKUP_WINDOW_END: f32 = 20.0;
/// Phases 1+2 fill up to here; the tail is the completion event.
const WORK_WINDOW_END: f32 = 90.0;

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Take a zip backup of the live tree into this directory before
    /// touching anything.
    pub backup_dir: Option<PathBuf>,
}

/// Outcome of an apply run. Deletions are best-effort, so their per-item
/// results are reported here instead of failing the run.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub backup_path: Option<PathBuf>,
    pub deletions: Vec<ItemOutcome>,
    pub applied: usize,
}

/// Mutates the live tree to converge it toward the reference snapshot held
/// in the staging directory.
#[derive(Debug, Clone)]
pub struct ApplyEngine {
    live_root: PathBuf,
    staging_root: PathBuf,
}

impl ApplyEngine {
    pub fn new(live_root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            live_root: live_root.into(),
            staging_root: staging_root.into(),
        }
    }

    /// Run the apply: optional backup, then best-effort deletions, then
    /// fatal-on-error additions and replacements.
    pub fn apply(
        &self,
        diff: &DiffResult,
        options: &ApplyOptions,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<ApplyReport, SyncError> {
        let mut report = ApplyReport::default();

        let work_start = if let Some(backup_dir) = &options.backup_dir {
            let backup = BackupArchiver::new(&self.live_root, backup_dir);
            let zip_path = backup.run(&reporter.window(0.0, BACKUP_WINDOW_END), cancel)?;
            reporter.percent(BACKUP_WINDOW_END, "Backup complete.");
            report.backup_path = Some(zip_path);
            BACKUP_WINDOW_END
        } else {
            0.0
        };

        let work = reporter.window(work_start, WORK_WINDOW_END);
        let total = diff.work_items();
        let mut done = 0usize;

        // Phase 1: deletions, individually best-effort.
        for entry in &diff.deletions {
            cancel.checkpoint()?;
            report.deletions.push(self.delete_entry(entry));
            done += 1;
            if total > 0 {
                work.percent(
                    done as f32 / total as f32 * 100.0,
                    format!("Deleting: {}", entry.rel_path),
                );
            }
        }

        // Phase 2: additions and replacements in one sorted pass, so parent
        // directories are created before their contents. Any failure aborts.
        let mut incoming: Vec<&PathEntry> =
            diff.additions.iter().chain(&diff.replacements).collect();
        incoming.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        for entry in incoming {
            cancel.checkpoint()?;
            self.place_entry(entry)?;
            report.applied += 1;
            done += 1;
            if total > 0 {
                work.percent(
                    done as f32 / total as f32 * 100.0,
                    format!("Copying: {}", entry.rel_path),
                );
            }
        }

        reporter.percent(100.0, "Done.");
        info!(
            applied = report.applied,
            deletions = report.deletions.len(),
            failed_deletions = report.deletions.iter().filter(|o| o.is_failed()).count(),
            "apply complete"
        );
        Ok(report)
    }

    fn delete_entry(&self, entry: &PathEntry) -> ItemOutcome {
        let target = self.live_root.join(&entry.rel_path);
        if !target.exists() {
            return ItemOutcome::skipped(&entry.rel_path, "not present");
        }
        let result = if entry.is_dir && target.is_dir() {
            remove_dir_tree(&target)
        } else if !entry.is_dir && target.is_file() {
            remove_file_forced(&target)
        } else {
            // Type changed since the scan; take whatever is there now.
            if target.is_dir() {
                remove_dir_tree(&target)
            } else {
                remove_file_forced(&target)
            }
        };
        match result {
            Ok(()) => ItemOutcome::ok(&entry.rel_path),
            Err(e) => {
                warn!(path = %target.display(), error = %e, "deletion failed");
                ItemOutcome::failed(&entry.rel_path, e.to_string())
            }
        }
    }

    fn place_entry(&self, entry: &PathEntry) -> Result<(), SyncError> {
        let src = self.staging_root.join(&entry.rel_path);
        let dst = self.live_root.join(&entry.rel_path);
        if entry.is_dir {
            if !dst.exists() {
                fs::create_dir_all(&dst).map_err(|source| SyncError::Apply {
                    src: src.clone(),
                    dst: dst.clone(),
                    source,
                })?;
            }
            return Ok(());
        }

        let copy = |src: &Path, dst: &Path| -> std::io::Result<()> {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            if dst.exists() {
                clear_readonly(dst)?;
            }
            fs::copy(src, dst)?;
            Ok(())
        };
        copy(&src, &dst).map_err(|source| SyncError::Apply {
            src,
            dst,
            source,
        })
    }
}

fn clear_readonly(path: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Depth-first removal: clear read-only bits and delete contained files and
/// subdirectories before the directory itself.
fn remove_dir_tree(root: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())?;
        } else {
            remove_file_forced(entry.path())?;
        }
    }
    Ok(())
}

fn remove_file_forced(path: &Path) -> std::io::Result<()> {
    clear_readonly(path)?;
    fs::remove_file(path)
}
