//! Progress reporting primitives.
//!
//! Events are fire-and-forget over an unbounded channel; producers never
//! block on a slow consumer. Within a single operation the percent reported
//! for a given phase is monotonic non-decreasing and capped at 100.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Phase tag carried by every event, matching the progress surfaces the
/// caller renders (one bar per phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Default,
    Download,
    Extract,
    Backup,
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// `None` means indeterminate: the operation is running but its total is
    /// unknown, so no percentage is interpolated.
    pub percent: Option<f32>,
    pub message: String,
}

/// Handle used by operations to emit progress. Cheap to clone; `window`
/// derives reporters that map their 0–100 range into a sub-range of the
/// parent, which is how backup progress nests inside apply.
#[derive(Clone)]
pub struct Reporter {
    tx: Option<UnboundedSender<ProgressEvent>>,
    phase: Phase,
    floor: f32,
    span: f32,
    high_water: Arc<Mutex<HashMap<Phase, f32>>>,
}

impl Reporter {
    /// Create a reporter paired with the receiving end of its event channel.
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                phase: Phase::Default,
                floor: 0.0,
                span: 100.0,
                high_water: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        )
    }

    /// A reporter that discards every event. Useful in tests and for callers
    /// that do not render progress.
    pub fn sink() -> Self {
        Self {
            tx: None,
            phase: Phase::Default,
            floor: 0.0,
            span: 100.0,
            high_water: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Switch the phase tag, keeping the full 0–100 window.
    pub fn phase(&self, phase: Phase) -> Self {
        Self {
            phase,
            floor: 0.0,
            span: 100.0,
            ..self.clone()
        }
    }

    /// Derive a reporter whose 0–100 input range maps into `[lo, hi]` of this
    /// reporter's window. The phase tag is inherited.
    pub fn window(&self, lo: f32, hi: f32) -> Self {
        debug_assert!((0.0..=100.0).contains(&lo) && lo <= hi && hi <= 100.0);
        Self {
            floor: self.floor + lo / 100.0 * self.span,
            span: (hi - lo) / 100.0 * self.span,
            ..self.clone()
        }
    }

    /// Report a percentage (clamped to `[0, 100]`, mapped through the window,
    /// and never lower than a previously reported value for the same phase).
    pub fn percent(&self, percent: f32, message: impl Into<String>) {
        let mapped = self.floor + percent.clamp(0.0, 100.0) / 100.0 * self.span;
        let value = {
            let mut table = self.high_water.lock();
            let slot = table.entry(self.phase).or_insert(0.0);
            if mapped > *slot {
                *slot = mapped;
            }
            *slot
        };
        self.send(Some(value.min(100.0)), message.into());
    }

    /// Report activity without a percentage (unknown total).
    pub fn indeterminate(&self, message: impl Into<String>) {
        self.send(None, message.into());
    }

    fn send(&self, percent: Option<f32>, message: String) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                phase: self.phase,
                percent,
                message,
            });
        }
    }
}

/// Byte counter for the download phase: emits percent when the total size is
/// advertised and indeterminate events otherwise.
#[derive(Debug)]
pub struct DownloadMeter {
    total: Option<u64>,
    written: u64,
}

impl DownloadMeter {
    pub fn new(total: Option<u64>) -> Self {
        Self { total, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn advance(&mut self, bytes: u64, reporter: &Reporter) {
        self.written += bytes;
        match self.total {
            Some(total) if total > 0 => {
                let percent = self.written as f32 / total as f32 * 100.0;
                reporter.percent(percent, "Downloading...");
            }
            _ => reporter.indeterminate(format!("Downloading... {} bytes", self.written)),
        }
    }
}

/// Drain every event currently buffered on `rx`. Test helper for asserting
/// emitted sequences without awaiting.
pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
