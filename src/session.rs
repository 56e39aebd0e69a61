//! Session state machine driving the full sync pipeline.
//!
//! One session owns at most one long-running operation at a time; a second
//! start attempt is rejected with [`SyncError::Busy`] rather than queued.
//! Blocking work (scans, backup, apply) runs on the Tokio blocking pool while
//! progress flows through the reporter channel.

use crate::apply::{ApplyEngine, ApplyOptions, ApplyReport};
use crate::backup::BackupArchiver;
use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::diff::diff;
use crate::error::SyncError;
use crate::fetch::{ReferenceFetcher, StagingRepository};
use crate::progress::{Phase, Reporter};
use crate::scan::DirectoryScanner;
use crate::types::{DiffResult, ItemOutcome};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Everything a completed check produced. The staging tree lives here and
/// nowhere else: applying (or resetting) consumes the payload, so a stale
/// staging path can never be applied twice.
#[derive(Debug)]
pub struct SummaryPayload {
    pub diff: DiffResult,
    pub staging: StagingRepository,
    pub scan_failures: Vec<ItemOutcome>,
}

#[derive(Debug)]
pub enum SessionState {
    Idle,
    NeedPath,
    Scanning,
    Summary(SummaryPayload),
    Success { backup_path: Option<PathBuf> },
    Error { message: String, detail: String },
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Idle => StateKind::Idle,
            SessionState::NeedPath => StateKind::NeedPath,
            SessionState::Scanning => StateKind::Scanning,
            SessionState::Summary(_) => StateKind::Summary,
            SessionState::Success { .. } => StateKind::Success,
            SessionState::Error { .. } => StateKind::Error,
        }
    }
}

/// Payload-free view of the state, for callers that only render it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Idle,
    NeedPath,
    Scanning,
    Summary,
    Success,
    Error,
}

pub struct Session {
    config: SyncConfig,
    mods_dir: Mutex<Option<PathBuf>>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
    cancel: Mutex<CancelToken>,
}

/// Releases the single-task slot when the operation finishes.
struct SlotGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Session {
    pub fn new(config: SyncConfig) -> Self {
        let mods_dir = config.mods_dir.clone();
        let state = if mods_dir.is_some() {
            SessionState::Idle
        } else {
            SessionState::NeedPath
        };
        Self {
            config,
            mods_dir: Mutex::new(mods_dir),
            state: Mutex::new(state),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    pub fn state_kind(&self) -> StateKind {
        self.state.lock().kind()
    }

    /// Point the session at a live tree, leaving `NeedPath`.
    pub fn set_mods_dir(&self, path: impl Into<PathBuf>) {
        *self.mods_dir.lock() = Some(path.into());
        let mut state = self.state.lock();
        if matches!(*state, SessionState::NeedPath) {
            *state = SessionState::Idle;
        }
    }

    /// Cancel whatever operation is currently running.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Drop any held staging tree and return to the starting state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = if self.mods_dir.lock().is_some() {
            SessionState::Idle
        } else {
            SessionState::NeedPath
        };
    }

    /// Fetch the reference archive, scan both trees and compute the diff.
    /// Ends in `Summary` on success, `Error` on failure, `NeedPath` when no
    /// live tree is configured.
    pub async fn check(&self, reporter: &Reporter) -> Result<StateKind, SyncError> {
        let _slot = self.acquire()?;
        let Some(mods_dir) = self.mods_dir.lock().clone() else {
            *self.state.lock() = SessionState::NeedPath;
            return Ok(StateKind::NeedPath);
        };
        let cancel = self.fresh_cancel();
        *self.state.lock() = SessionState::Scanning;

        match self.run_check(mods_dir, reporter, &cancel).await {
            Ok(payload) => {
                info!(
                    deletions = payload.diff.deletions.len(),
                    additions = payload.diff.additions.len(),
                    replacements = payload.diff.replacements.len(),
                    "check complete"
                );
                *self.state.lock() = SessionState::Summary(payload);
                Ok(StateKind::Summary)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_check(
        &self,
        mods_dir: PathBuf,
        reporter: &Reporter,
        cancel: &CancelToken,
    ) -> Result<SummaryPayload, SyncError> {
        let fetcher = ReferenceFetcher::new(
            &self.config.archive_url,
            Duration::from_secs(self.config.http_timeout_secs),
        )?;
        let staging = fetcher.fetch(reporter, cancel).await?;
        cancel.checkpoint()?;

        let live_scanner = DirectoryScanner::new(mods_dir).filter_garbage(self.config.filter_garbage);
        let live = run_blocking(move || live_scanner.scan()).await?;
        cancel.checkpoint()?;

        let ref_scanner = DirectoryScanner::new(staging.path());
        let reference = run_blocking(move || ref_scanner.scan()).await?;
        cancel.checkpoint()?;

        let diff = diff(&live.map, &reference.map);
        let mut scan_failures = live.failures;
        scan_failures.extend(reference.failures);
        Ok(SummaryPayload {
            diff,
            staging,
            scan_failures,
        })
    }

    /// Read-only view of a held summary, if any.
    pub fn summary<R>(&self, f: impl FnOnce(&SummaryPayload) -> R) -> Option<R> {
        match &*self.state.lock() {
            SessionState::Summary(payload) => Some(f(payload)),
            _ => None,
        }
    }

    /// Apply the held summary to the live tree, consuming the staging tree.
    pub async fn apply(
        &self,
        take_backup: bool,
        reporter: &Reporter,
    ) -> Result<ApplyReport, SyncError> {
        let _slot = self.acquire()?;
        let payload = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, SessionState::Scanning) {
                SessionState::Summary(payload) => payload,
                other => {
                    *state = other;
                    return Err(SyncError::State(
                        "apply requires a completed check".to_string(),
                    ));
                }
            }
        };
        let Some(mods_dir) = self.mods_dir.lock().clone() else {
            *self.state.lock() = SessionState::NeedPath;
            return Err(SyncError::State("no live directory configured".to_string()));
        };

        let backup_dir = if take_backup {
            Some(self.config.backup_dir()?)
        } else {
            None
        };
        let cancel = self.fresh_cancel();
        let engine = ApplyEngine::new(mods_dir, payload.staging.path());
        let options = ApplyOptions { backup_dir };
        let diff = payload.diff.clone();
        let apply_reporter = reporter.phase(Phase::Apply);
        let worker_cancel = cancel.clone();

        let result =
            run_blocking(move || engine.apply(&diff, &options, &apply_reporter, &worker_cancel))
                .await;
        if let Err(e) = payload.staging.cleanup() {
            warn!(error = %e, "staging cleanup failed");
        }

        match result {
            Ok(report) => {
                *self.state.lock() = SessionState::Success {
                    backup_path: report.backup_path.clone(),
                };
                Ok(report)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Standalone backup of the live tree; does not touch a held summary.
    pub async fn backup(&self, reporter: &Reporter) -> Result<PathBuf, SyncError> {
        let _slot = self.acquire()?;
        let Some(mods_dir) = self.mods_dir.lock().clone() else {
            return Err(SyncError::State("no live directory configured".to_string()));
        };
        let dest = self.config.backup_dir()?;
        let cancel = self.fresh_cancel();
        let backup_reporter = reporter.phase(Phase::Backup);
        run_blocking(move || BackupArchiver::new(mods_dir, dest).run(&backup_reporter, &cancel))
            .await
    }

    fn acquire(&self) -> Result<SlotGuard<'_>, SyncError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(SlotGuard { flag: &self.busy })
        } else {
            Err(SyncError::Busy)
        }
    }

    fn fresh_cancel(&self) -> CancelToken {
        let token = CancelToken::new();
        *self.cancel.lock() = token.clone();
        token
    }

    fn fail(&self, error: &SyncError) {
        *self.state.lock() = SessionState::Error {
            message: error.to_string(),
            detail: format!("{error:?}"),
        };
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SyncError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::State(format!("worker task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Reporter;
    use tempfile::TempDir;

    fn config_with(mods_dir: Option<PathBuf>) -> SyncConfig {
        SyncConfig {
            archive_url: "http://127.0.0.1:9/never".to_string(),
            mods_dir,
            ..SyncConfig::default()
        }
    }

    #[test]
    fn starts_in_need_path_without_mods_dir() {
        let session = Session::new(config_with(None));
        assert_eq!(session.state_kind(), StateKind::NeedPath);
        session.set_mods_dir("/tmp/mods");
        assert_eq!(session.state_kind(), StateKind::Idle);
    }

    #[tokio::test]
    async fn second_operation_is_rejected() {
        let mods = TempDir::new().unwrap();
        let session = Session::new(config_with(Some(mods.path().to_path_buf())));
        let _slot = session.acquire().unwrap();
        let err = session.backup(&Reporter::sink()).await.unwrap_err();
        assert!(matches!(err, SyncError::Busy));
    }

    #[test]
    fn slot_is_released_when_guard_drops() {
        let session = Session::new(config_with(None));
        drop(session.acquire().unwrap());
        assert!(session.acquire().is_ok());
    }

    #[tokio::test]
    async fn apply_without_summary_is_a_state_error() {
        let mods = TempDir::new().unwrap();
        let session = Session::new(config_with(Some(mods.path().to_path_buf())));
        let err = session.apply(false, &Reporter::sink()).await.unwrap_err();
        assert!(matches!(err, SyncError::State(_)));
        assert_eq!(session.state_kind(), StateKind::Idle);
    }

    #[test]
    fn reset_drops_held_staging() {
        let mods = TempDir::new().unwrap();
        let session = Session::new(config_with(Some(mods.path().to_path_buf())));
        let staging = StagingRepository::create().unwrap();
        let staging_path = staging.path().to_path_buf();
        *session.state.lock() = SessionState::Summary(SummaryPayload {
            diff: DiffResult::default(),
            staging,
            scan_failures: Vec::new(),
        });
        assert_eq!(session.state_kind(), StateKind::Summary);

        session.reset();
        assert_eq!(session.state_kind(), StateKind::Idle);
        assert!(!staging_path.exists());
    }

    #[tokio::test]
    async fn failed_check_lands_in_error_state() {
        let mods = TempDir::new().unwrap();
        // Port 9 (discard) refuses connections; the fetch fails fast.
        let session = Session::new(config_with(Some(mods.path().to_path_buf())));
        let result = session.check(&Reporter::sink()).await;
        assert!(result.is_err());
        assert_eq!(session.state_kind(), StateKind::Error);
    }
}
