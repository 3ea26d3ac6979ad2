use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::config::MirrorConfig;
use crate::control::CancelToken;
use crate::error::{MirrorError, Result};
use crate::events::{EventSender, StatusEvent};
use crate::path_mapper;

/// Ceiling on exponential backoff regardless of the configured base.
const MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Poll interval while another worker finishes the same download.
const INFLIGHT_POLL: Duration = Duration::from_millis(25);

/// Why one attempt failed, for the retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The request exceeded the per-request timeout.
    Timeout,
    /// Connect, TLS, or body transport trouble.
    Connection,
    /// Server answered with a non-success status.
    Status(u16),
}

impl FetchErrorKind {
    fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Connection
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Timeout => "request timed out".to_string(),
            Self::Connection => "connection failure".to_string(),
            Self::Status(code) => format!("http status {code}"),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Bounded exponential backoff over a configured set of transient statuses.
///
/// Connection-level failures and timeouts are always considered transient;
/// any other status fails on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable_statuses: BTreeSet<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            base_delay: config.retry_backoff(),
            max_delay: MAX_BACKOFF,
            retryable_statuses: config.retryable_status_codes.clone(),
        }
    }

    fn is_transient(&self, kind: &FetchErrorKind) -> bool {
        match kind {
            FetchErrorKind::Timeout | FetchErrorKind::Connection => true,
            FetchErrorKind::Status(code) => self.retryable_statuses.contains(code),
        }
    }

    /// Decide the fate of 1-based `attempt` after it failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: &FetchErrorKind) -> RetryDecision {
        if !self.is_transient(kind) || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        RetryDecision::RetryAfter(delay.min(self.max_delay))
    }
}

/// What became of a requested resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// Stored at this root-relative path: fetched just now, by an earlier
    /// referent, or found on disk from a previous run.
    Stored(PathBuf),
    /// Terminal failure; referencing attributes stay remote.
    Failed(String),
}

#[derive(Debug, Clone)]
enum SlotState {
    InFlight,
    Done(ResourceOutcome),
}

enum AttemptError {
    Net(FetchErrorKind),
    Disk(std::io::Error),
}

/// Shared downloader for pages and assets.
///
/// Assets are deduplicated by destination path: the first caller claims the
/// slot and performs the network fetch, later callers reuse whatever outcome
/// it recorded, so each destination is fetched over the network at most once
/// per run. A semaphore bounds how many asset downloads run at a time.
pub struct Fetcher {
    client: Client,
    root: PathBuf,
    policy: RetryPolicy,
    limiter: Semaphore,
    slots: Mutex<HashMap<PathBuf, SlotState>>,
    cancel: CancelToken,
    events: EventSender,
}

impl Fetcher {
    pub fn new(
        client: Client,
        root: PathBuf,
        policy: RetryPolicy,
        resource_workers: usize,
        cancel: CancelToken,
        events: EventSender,
    ) -> Self {
        Self {
            client,
            root,
            policy,
            limiter: Semaphore::new(resource_workers.max(1)),
            slots: Mutex::new(HashMap::new()),
            cancel,
            events,
        }
    }

    /// Download `url` into the tree, or reuse whatever already happened for
    /// its destination.
    pub async fn fetch_resource(&self, url: &Url) -> ResourceOutcome {
        let rel = path_mapper::to_local_path(url);
        loop {
            let claimed = {
                let mut slots = self.slots.lock().unwrap();
                match slots.get(&rel) {
                    Some(SlotState::Done(outcome)) => {
                        debug!(url = %url, "reusing recorded outcome");
                        return outcome.clone();
                    }
                    Some(SlotState::InFlight) => false,
                    None => {
                        slots.insert(rel.clone(), SlotState::InFlight);
                        true
                    }
                }
            };
            if claimed {
                break;
            }
            tokio::time::sleep(INFLIGHT_POLL).await;
        }

        let outcome = self.download(url, &rel).await;
        if let ResourceOutcome::Failed(reason) = &outcome {
            warn!(url = %url, reason, "resource left remote");
            self.events.emit(StatusEvent::ResourceFailed {
                url: url.clone(),
                reason: reason.clone(),
            });
        }
        let mut slots = self.slots.lock().unwrap();
        slots.insert(rel, SlotState::Done(outcome.clone()));
        outcome
    }

    /// Fetch an HTML page body into memory under the same retry policy.
    pub async fn fetch_page(&self, url: &Url) -> Result<String> {
        let mut attempt = 1u32;
        loop {
            let kind = match self.send_checked(url).await {
                Ok(response) => match response.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => FetchErrorKind::classify(&e),
                },
                Err(kind) => kind,
            };
            match self.policy.decide(attempt, &kind) {
                RetryDecision::RetryAfter(delay) if !self.cancel.is_cancelled() => {
                    debug!(url = %url, attempt, "page fetch retry after {}", kind.describe());
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => {
                    return Err(MirrorError::FetchFailed {
                        url: url.to_string(),
                        reason: format!("{} after {attempt} attempt(s)", kind.describe()),
                    })
                }
            }
        }
    }

    /// (stored, failed) tallies over every destination seen this run.
    pub fn counts(&self) -> (usize, usize) {
        let slots = self.slots.lock().unwrap();
        let mut stored = 0;
        let mut failed = 0;
        for state in slots.values() {
            match state {
                SlotState::Done(ResourceOutcome::Stored(_)) => stored += 1,
                SlotState::Done(ResourceOutcome::Failed(_)) => failed += 1,
                SlotState::InFlight => {}
            }
        }
        (stored, failed)
    }

    async fn download(&self, url: &Url, rel: &Path) -> ResourceOutcome {
        let dest = self.root.join(rel);
        if dest.exists() {
            debug!(path = %dest.display(), "already on disk, reusing");
            return ResourceOutcome::Stored(rel.to_path_buf());
        }
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ResourceOutcome::Failed("downloader shut down".to_string()),
        };
        match self.stream_to_disk(url, &dest).await {
            Ok(()) => {
                debug!(url = %url, path = %dest.display(), "stored");
                ResourceOutcome::Stored(rel.to_path_buf())
            }
            Err(reason) => ResourceOutcome::Failed(reason),
        }
    }

    async fn stream_to_disk(&self, url: &Url, dest: &Path) -> std::result::Result<(), String> {
        let part = partial_path(dest);
        let mut attempt = 1u32;
        loop {
            match self.attempt_stream(url, dest, &part).await {
                Ok(()) => return Ok(()),
                Err(AttemptError::Disk(err)) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    return Err(format!("write {}: {err}", dest.display()));
                }
                Err(AttemptError::Net(kind)) => {
                    let _ = tokio::fs::remove_file(&part).await;
                    match self.policy.decide(attempt, &kind) {
                        RetryDecision::RetryAfter(delay) if !self.cancel.is_cancelled() => {
                            debug!(url = %url, attempt, "retry after {}", kind.describe());
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        _ => return Err(format!("{} after {attempt} attempt(s)", kind.describe())),
                    }
                }
            }
        }
    }

    /// One download attempt: GET, stream the body to a partial file, rename.
    /// The rename keeps every file under its final name complete.
    async fn attempt_stream(
        &self,
        url: &Url,
        dest: &Path,
        part: &Path,
    ) -> std::result::Result<(), AttemptError> {
        let response = self.send_checked(url).await.map_err(AttemptError::Net)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(AttemptError::Disk)?;
        }
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(AttemptError::Disk)?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AttemptError::Net(FetchErrorKind::classify(&e)))?;
            file.write_all(&chunk).await.map_err(AttemptError::Disk)?;
        }
        file.flush().await.map_err(AttemptError::Disk)?;
        drop(file);
        tokio::fs::rename(part, dest)
            .await
            .map_err(AttemptError::Disk)?;
        Ok(())
    }

    async fn send_checked(&self, url: &Url) -> std::result::Result<reqwest::Response, FetchErrorKind> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchErrorKind::classify(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchErrorKind::Status(status.as_u16()));
        }
        Ok(response)
    }
}

/// Sibling name a download is written under until it is complete. Every call
/// hands out a fresh name, so jobs that map to the same destination never
/// share a temp file and a rename publishes exactly one job's complete bytes.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(format!(
        ".{}-{}.part",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    dest.with_file_name(name)
}
