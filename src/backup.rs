//! Tree backup: snapshot copy followed by zip compression.

use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::progress::Reporter;
use crate::scan::path::rel_key;
use chrono::{DateTime, Local};
use filetime::FileTime;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const BACKUP_PREFIX: &str = "Mods_Backup_";

/// Share of the progress window spent on the copy phase; the rest covers
/// compression.
const COPY_WEIGHT: f32 = 70.0;

/// Directory/zip stem for a backup taken at `now`.
pub fn backup_stem(now: DateTime<Local>) -> String {
    format!("{BACKUP_PREFIX}{}", now.format("%Y%m%d_%H%M%S"))
}

/// Copies a source tree to an ephemeral snapshot next to the destination
/// zip, compresses the snapshot per-file with deflate, then removes the
/// snapshot. Progress is split across the caller-supplied window: the same
/// archiver runs standalone (full 0–100 window, Backup phase) and as the
/// reserved opening window of an apply.
#[derive(Debug, Clone)]
pub struct BackupArchiver {
    source: PathBuf,
    dest_dir: PathBuf,
}

impl BackupArchiver {
    pub fn new(source: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest_dir: dest_dir.into(),
        }
    }

    pub fn run(&self, reporter: &Reporter, cancel: &CancelToken) -> Result<PathBuf, SyncError> {
        let stem = backup_stem(Local::now());
        let ephemeral = self.dest_dir.join(&stem);
        let zip_path = self.dest_dir.join(format!("{stem}.zip"));

        let total_files = count_files(&self.source)?;
        copy_tree(
            &self.source,
            &ephemeral,
            total_files,
            &reporter.window(0.0, COPY_WEIGHT),
            cancel,
        )?;
        compress_tree(
            &ephemeral,
            &zip_path,
            total_files,
            &reporter.window(COPY_WEIGHT, 100.0),
            cancel,
        )?;
        fs::remove_dir_all(&ephemeral).map_err(|e| {
            SyncError::fs(
                format!("failed to remove snapshot copy {}", ephemeral.display()),
                e,
            )
        })?;

        reporter.percent(100.0, format!("Backup complete: {}", zip_path.display()));
        info!(zip = %zip_path.display(), files = total_files, "backup written");
        Ok(zip_path)
    }
}

fn count_files(root: &Path) -> Result<usize, SyncError> {
    let mut total = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            SyncError::fs(
                format!("failed to scan {}", root.display()),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        if entry.file_type().is_file() {
            total += 1;
        }
    }
    Ok(total)
}

/// Recursive copy preserving permissions and modification times. Zero files
/// is valid and produces no percent updates.
fn copy_tree(
    src: &Path,
    dst: &Path,
    total_files: usize,
    reporter: &Reporter,
    cancel: &CancelToken,
) -> Result<(), SyncError> {
    let context = |path: &Path| format!("failed to copy {} to {}", path.display(), dst.display());
    fs::create_dir_all(dst).map_err(|e| SyncError::fs(context(src), e))?;

    let mut copied = 0usize;
    for entry in WalkDir::new(src) {
        cancel.checkpoint()?;
        let entry = entry.map_err(|e| {
            SyncError::fs(
                context(src),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walked path is under its root");
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| SyncError::fs(context(entry.path()), e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| SyncError::fs(context(entry.path()), e))?;
            if let Ok(metadata) = entry.metadata() {
                let mtime = FileTime::from_last_modification_time(&metadata);
                let _ = filetime::set_file_mtime(&target, mtime);
            }
            copied += 1;
            if total_files > 0 {
                let percent = copied as f32 / total_files as f32 * 100.0;
                reporter.percent(percent, format!("Backing up... ({copied}/{total_files})"));
            }
        }
    }
    Ok(())
}

/// Compress the snapshot into a zip, one deflate entry per file, reporting
/// percent by entries written.
fn compress_tree(
    src: &Path,
    zip_path: &Path,
    total_files: usize,
    reporter: &Reporter,
    cancel: &CancelToken,
) -> Result<(), SyncError> {
    let fs_err = |e: std::io::Error| {
        SyncError::fs(format!("failed to create backup zip {}", zip_path.display()), e)
    };
    let zip_err = |e: zip::result::ZipError| {
        fs_err(std::io::Error::new(std::io::ErrorKind::Other, e))
    };

    let out = File::create(zip_path).map_err(fs_err)?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // Sorted traversal keeps archive layout deterministic.
    let mut entries: Vec<_> = WalkDir::new(src)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| fs_err(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    let mut written = 0usize;
    for entry in entries {
        cancel.checkpoint()?;
        if entry.depth() == 0 {
            continue;
        }
        let Some(name) = rel_key(src, entry.path()) else {
            continue;
        };
        if entry.file_type().is_dir() {
            writer.add_directory(name, options).map_err(zip_err)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options).map_err(zip_err)?;
            let mut input = File::open(entry.path()).map_err(fs_err)?;
            std::io::copy(&mut input, &mut writer).map_err(fs_err)?;
            written += 1;
            if total_files > 0 {
                let percent = written as f32 / total_files as f32 * 100.0;
                reporter.percent(
                    percent,
                    format!("Creating backup zip: {written}/{total_files}"),
                );
            }
        }
    }
    writer.finish().map_err(zip_err)?;
    Ok(())
}
