//! Reference archive fetching: streamed download plus zip extraction into a
//! staging directory.

use crate::cancel::CancelToken;
use crate::error::SyncError;
use crate::progress::{DownloadMeter, Phase, Reporter};
use futures::StreamExt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};
use zip::result::ZipError;
use zip::ZipArchive;

/// A completed download smaller than this is rejected as corrupt: no valid
/// reference archive is ever this small.
pub const MIN_ARCHIVE_BYTES: u64 = 128;

/// Temporary directory holding an extracted reference snapshot.
///
/// The active session owns the staging tree exclusively from fetch
/// completion until cleanup; `cleanup` consumes the value, so code that has
/// released the staging tree can no longer name its path.
#[derive(Debug)]
pub struct StagingRepository {
    dir: TempDir,
}

impl StagingRepository {
    pub fn create() -> Result<Self, SyncError> {
        let dir = TempDir::with_prefix("modsync-staging-")
            .map_err(|e| SyncError::fs("failed to create staging directory", e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the staging tree. Dropping the value has the same effect with
    /// the error swallowed; this form surfaces it.
    pub fn cleanup(self) -> Result<(), SyncError> {
        self.dir
            .close()
            .map_err(|e| SyncError::fs("failed to remove staging directory", e))
    }
}

/// Downloads the reference archive and extracts it into a fresh
/// [`StagingRepository`], reporting two-phase progress (download, extract).
#[derive(Debug, Clone)]
pub struct ReferenceFetcher {
    client: reqwest::Client,
    url: String,
}

impl ReferenceFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch and extract the reference snapshot. The downloaded archive is a
    /// named temporary file that is deleted best-effort whatever the
    /// outcome.
    pub async fn fetch(
        &self,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<StagingRepository, SyncError> {
        let staging = StagingRepository::create()?;
        let archive = self.download(&reporter.phase(Phase::Download), cancel).await?;
        let entries = extract(
            archive.path(),
            staging.path(),
            &reporter.phase(Phase::Extract),
            cancel,
        )?;
        info!(url = %self.url, entries, staging = %staging.path().display(), "reference snapshot ready");
        Ok(staging)
    }

    async fn download(
        &self,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<NamedTempFile, SyncError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let mut meter = DownloadMeter::new(response.content_length());
        let mut out = NamedTempFile::new()
            .map_err(|e| SyncError::fs("failed to create download temp file", e))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            cancel.checkpoint()?;
            let chunk = chunk?;
            out.write_all(&chunk)
                .map_err(|e| SyncError::fs("failed writing downloaded archive", e))?;
            meter.advance(chunk.len() as u64, reporter);
        }
        out.flush()
            .map_err(|e| SyncError::fs("failed writing downloaded archive", e))?;

        if meter.written() < MIN_ARCHIVE_BYTES {
            return Err(SyncError::UndersizedArchive {
                size: meter.written(),
            });
        }
        debug!(bytes = meter.written(), "download complete");
        Ok(out)
    }
}

/// Extract every entry of `archive_path` into `dest`, in archive order,
/// reporting `index/count` percent. A failure for one entry aborts the
/// extraction with the entry's name in the error.
pub fn extract(
    archive_path: &Path,
    dest: &Path,
    reporter: &Reporter,
    cancel: &CancelToken,
) -> Result<usize, SyncError> {
    let file = File::open(archive_path)
        .map_err(|e| SyncError::fs("failed to open downloaded archive", e))?;
    let mut archive = ZipArchive::new(file).map_err(SyncError::CorruptArchive)?;
    let count = archive.len();

    for index in 0..count {
        cancel.checkpoint()?;
        let mut entry = archive.by_index(index).map_err(SyncError::CorruptArchive)?;
        let name = entry.name().to_string();
        extract_entry(&mut entry, dest).map_err(|source| SyncError::ExtractEntry {
            entry: name,
            source,
        })?;
        if count > 0 {
            let percent = (index + 1) as f32 / count as f32 * 100.0;
            reporter.percent(percent, "Extracting...");
        }
    }
    reporter.percent(100.0, "Finished.");
    Ok(count)
}

fn extract_entry(entry: &mut zip::read::ZipFile<'_>, dest: &Path) -> Result<(), ZipError> {
    let Some(rel) = entry.enclosed_name() else {
        return Err(ZipError::InvalidArchive("entry escapes the staging root"));
    };
    let out_path = dest.join(rel);
    if entry.is_dir() {
        std::fs::create_dir_all(&out_path)?;
        return Ok(());
    }
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = File::create(&out_path)?;
    std::io::copy(entry, &mut out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{drain, Reporter};
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            if name.ends_with('/') {
                writer.add_directory(name.trim_end_matches('/'), options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extract_reproduces_entries() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("ref.zip");
        std::fs::write(
            &archive_path,
            zip_bytes(&[
                ("a.txt", b"alpha".as_slice()),
                ("sub/", b"".as_slice()),
                ("sub/b.txt", b"beta".as_slice()),
            ]),
        )
        .unwrap();

        let dest = temp_dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        let (reporter, mut rx) = Reporter::channel();
        let count = extract(
            &archive_path,
            &dest,
            &reporter.phase(Phase::Extract),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(count, 3);
        assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(std::fs::read(dest.join("sub/b.txt")).unwrap(), b"beta");

        let percents: Vec<f32> = drain(&mut rx).iter().filter_map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100.0);
    }

    #[test]
    fn garbage_archive_is_corrupt() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("bad.zip");
        std::fs::write(&archive_path, b"this is not a zip file").unwrap();

        let result = extract(
            &archive_path,
            temp_dir.path(),
            &Reporter::sink(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(SyncError::CorruptArchive(_))));
    }

    #[test]
    fn cancelled_extraction_stops() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("ref.zip");
        std::fs::write(&archive_path, zip_bytes(&[("a.txt", b"alpha".as_slice())])).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let result = extract(&archive_path, temp_dir.path(), &Reporter::sink(), &token);
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[test]
    fn staging_cleanup_removes_tree() {
        let staging = StagingRepository::create().unwrap();
        let path = staging.path().to_path_buf();
        std::fs::write(path.join("f.txt"), "x").unwrap();
        staging.cleanup().unwrap();
        assert!(!path.exists());
    }
}
