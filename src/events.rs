use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

/// One entry in the per-run status stream.
///
/// The stream is advisory: the run never waits on the receiver, and once the
/// receiver is gone further events are silently discarded.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Started { seeds: usize, output_root: PathBuf },
    PageFetched { url: Url, discovered: usize },
    PageFailed { url: Url, reason: String },
    ResourceFailed { url: Url, reason: String },
    Completed(RunSummary),
    Archived { path: PathBuf },
    Fatal { reason: String },
}

/// Final accounting for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub resources_ok: usize,
    pub resources_failed: usize,
    pub elapsed: Duration,
    pub archive: ArchiveOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    NotRequested,
    Written(PathBuf),
    Failed(String),
}

/// Cloneable sending half of the status stream.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl EventSender {
    pub fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<StatusEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
