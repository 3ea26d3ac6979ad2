use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{info, warn};
use url::Url;

use crate::archiver;
use crate::config::MirrorConfig;
use crate::control::CancelToken;
use crate::error::{MirrorError, Result};
use crate::events::{ArchiveOutcome, EventSender, RunSummary, StatusEvent};
use crate::fetcher::{Fetcher, RetryPolicy};
use crate::frontier::Frontier;
use crate::page_processor::{PageProcessor, ProcessedPage};
use crate::path_mapper;

/// Everything one mirroring run needs, assembled by the CLI.
#[derive(Debug, Clone)]
pub struct MirrorRequest {
    pub seeds: Vec<String>,
    pub output_root: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub config: MirrorConfig,
}

/// Orchestrates a whole run: seed the frontier, drive the page workers,
/// then write the manifest and archive if asked for.
pub struct Mirror {
    request: MirrorRequest,
    cancel: CancelToken,
    events: EventSender,
}

impl Mirror {
    pub fn new(request: MirrorRequest, cancel: CancelToken, events: EventSender) -> Self {
        Self {
            request,
            cancel,
            events,
        }
    }

    /// Run to completion. Fatal errors are both returned and reported as an
    /// event so the progress surface never just goes quiet.
    pub async fn run(self) -> Result<RunSummary> {
        let started = Instant::now();
        let result = self.execute(started).await;
        if let Err(err) = &result {
            self.events.emit(StatusEvent::Fatal {
                reason: err.to_string(),
            });
        }
        result
    }

    async fn execute(&self, started: Instant) -> Result<RunSummary> {
        let seeds = parse_seeds(&self.request.seeds)?;
        let root = &self.request.output_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| MirrorError::fs(root.clone(), e))?;

        let config = &self.request.config;
        let client = build_http_client(config)?;
        let fetcher = Arc::new(Fetcher::new(
            client,
            root.clone(),
            RetryPolicy::from_config(config),
            config.resource_workers,
            self.cancel.clone(),
            self.events.clone(),
        ));
        let processor = Arc::new(PageProcessor::new(Arc::clone(&fetcher), root.clone()));
        let frontier = Frontier::new(seeds.clone(), config.max_pages);

        self.events.emit(StatusEvent::Started {
            seeds: seeds.len(),
            output_root: root.clone(),
        });
        info!(seeds = seeds.len(), root = %root.display(), "mirror started");

        let (pages_ok, pages_failed, claimed) =
            self.drive_pages(&frontier, &processor, config.page_workers).await;
        let (resources_ok, resources_failed) = fetcher.counts();

        let mut summary = RunSummary {
            pages_ok,
            pages_failed,
            resources_ok,
            resources_failed,
            elapsed: started.elapsed(),
            archive: ArchiveOutcome::NotRequested,
        };
        self.events.emit(StatusEvent::Completed(summary.clone()));

        if self.cancel.is_cancelled() {
            info!("cancelled, leaving the tree as it stands");
            return Ok(summary);
        }

        if let Some(manifest_path) = &self.request.manifest_path {
            if let Err(err) = write_manifest(manifest_path, &claimed).await {
                warn!(path = %manifest_path.display(), "manifest not written: {err}");
            }
        }

        if let Some(archive_path) = &self.request.archive_path {
            summary.archive = self.run_archiver(root, archive_path).await;
        }
        Ok(summary)
    }

    /// Claim pages from the frontier and process them on a bounded pool.
    /// Newly discovered links are enqueued as each page completes, so the
    /// crawl stays breadth-first.
    async fn drive_pages(
        &self,
        frontier: &Frontier,
        processor: &Arc<PageProcessor>,
        page_workers: usize,
    ) -> (usize, usize, Vec<Url>) {
        let mut workers: JoinSet<(Url, Result<ProcessedPage>)> = JoinSet::new();
        let mut pages_ok = 0usize;
        let mut pages_failed = 0usize;
        let mut claimed = Vec::new();

        loop {
            while workers.len() < page_workers.max(1) && !self.cancel.is_cancelled() {
                match frontier.next_pending() {
                    Some(url) => {
                        claimed.push(url.clone());
                        let processor = Arc::clone(processor);
                        workers.spawn(async move {
                            let outcome = processor.process(&url).await;
                            (url, outcome)
                        });
                    }
                    None => break,
                }
            }
            match workers.join_next().await {
                Some(Ok((url, Ok(page)))) => {
                    pages_ok += 1;
                    let mut discovered = 0;
                    for anchor in &page.anchors {
                        if frontier.try_enqueue(anchor) {
                            discovered += 1;
                        }
                    }
                    self.events.emit(StatusEvent::PageFetched { url, discovered });
                }
                Some(Ok((url, Err(err)))) => {
                    pages_failed += 1;
                    warn!(url = %url, "page dropped: {err}");
                    self.events.emit(StatusEvent::PageFailed {
                        url,
                        reason: err.to_string(),
                    });
                }
                Some(Err(join_err)) => {
                    pages_failed += 1;
                    warn!("page worker aborted: {join_err}");
                }
                None => break,
            }
        }
        (pages_ok, pages_failed, claimed)
    }

    async fn run_archiver(&self, root: &Path, archive_path: &Path) -> ArchiveOutcome {
        let root = root.to_path_buf();
        let path = archive_path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || archiver::archive_tree(&root, &path));
        match task.await {
            Ok(Ok(())) => {
                self.events.emit(StatusEvent::Archived {
                    path: archive_path.to_path_buf(),
                });
                ArchiveOutcome::Written(archive_path.to_path_buf())
            }
            Ok(Err(err)) => {
                warn!("{err}");
                ArchiveOutcome::Failed(err.to_string())
            }
            Err(join_err) => {
                warn!("archive task aborted: {join_err}");
                ArchiveOutcome::Failed(join_err.to_string())
            }
        }
    }
}

/// Parse the seed list, skipping whatever does not hold up as an absolute
/// http(s) URL. An empty result is fatal.
fn parse_seeds(raw: &[String]) -> Result<Vec<Url>> {
    let mut seeds = Vec::new();
    for candidate in raw {
        match path_mapper::parse_absolute(candidate) {
            Ok(url) => seeds.push(url),
            Err(err) => warn!(seed = candidate.as_str(), "seed skipped: {err}"),
        }
    }
    if seeds.is_empty() {
        return Err(MirrorError::NoValidSeeds);
    }
    Ok(seeds)
}

/// One line per claimed page URL, sorted, so successive runs diff cleanly.
async fn write_manifest(path: &Path, pages: &[Url]) -> std::io::Result<()> {
    let mut lines: Vec<String> = pages.iter().map(Url::to_string).collect();
    lines.sort();
    lines.dedup();
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    tokio::fs::write(path, body).await
}

fn build_http_client(config: &MirrorConfig) -> Result<Client> {
    let client = Client::builder()
        .use_rustls_tls()
        .cookie_store(true)
        .user_agent(concat!("sitepack/", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout())
        .build()?;
    Ok(client)
}
