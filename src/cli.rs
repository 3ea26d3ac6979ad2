use clap::Parser;
use std::path::PathBuf;

use crate::config::MirrorConfig;
use crate::error::Result;
use crate::mirror::MirrorRequest;

#[derive(Parser, Debug)]
#[command(
    name = "sitepack",
    about = "Mirror a website into a browsable local tree",
    version,
    long_about = "Crawls same-host pages breadth-first from one or more seed URLs, downloads the assets each page references, rewrites those references to the local copies, and can pack the finished tree into a zip archive."
)]
pub struct MirrorCommand {
    /// Seed URLs to start crawling from
    #[arg(required = true)]
    pub seeds: Vec<String>,

    /// Output directory for the mirrored tree
    #[arg(short, long, default_value = "./mirrored_site")]
    pub output_dir: PathBuf,

    /// Pack the finished tree into a zip archive at this path
    #[arg(short = 'a', long)]
    pub archive: Option<PathBuf>,

    /// Write the crawled page URLs, one per line, to this path
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Read defaults from a TOML config file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Attempts per URL before giving up
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Concurrent page workers
    #[arg(long)]
    pub page_workers: Option<usize>,

    /// Concurrent resource downloads
    #[arg(long)]
    pub resource_workers: Option<usize>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// More detailed logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl MirrorCommand {
    /// Effective configuration: built-in defaults, then the config file,
    /// then explicit flags, each layer overriding the one before.
    pub fn resolve_config(&self) -> Result<MirrorConfig> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::load(path)?,
            None => MirrorConfig::default(),
        };
        if let Some(v) = self.max_pages {
            config.max_pages = v;
        }
        if let Some(v) = self.retry_attempts {
            config.retry_attempts = v;
        }
        if let Some(v) = self.timeout {
            config.request_timeout_seconds = v;
        }
        if let Some(v) = self.page_workers {
            config.page_workers = v;
        }
        if let Some(v) = self.resource_workers {
            config.resource_workers = v;
        }
        Ok(config)
    }

    pub fn to_request(&self) -> Result<MirrorRequest> {
        Ok(MirrorRequest {
            seeds: self.seeds.clone(),
            output_root: self.output_dir.clone(),
            archive_path: self.archive.clone(),
            manifest_path: self.manifest.clone(),
            config: self.resolve_config()?,
        })
    }
}
