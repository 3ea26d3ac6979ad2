use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Tunables for one mirroring run.
///
/// Defaults: at most 100 pages, five attempts per fetch with exponential
/// backoff starting at one second, retrying only 502/503/504 and
/// connection-level failures, a 30 second request timeout, and small fixed
/// worker pools for pages and assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Ceiling on pages ever enqueued, seeds included.
    pub max_pages: usize,
    /// Attempts per URL before the fetch is declared failed.
    pub retry_attempts: u32,
    /// First backoff delay in seconds; doubles per attempt.
    pub retry_backoff_seconds: f64,
    /// Response statuses worth another attempt.
    pub retryable_status_codes: BTreeSet<u16>,
    /// Per-request timeout, independent of backoff.
    pub request_timeout_seconds: f64,
    /// Concurrent page jobs.
    pub page_workers: usize,
    /// Concurrent asset downloads across all pages.
    pub resource_workers: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            retry_attempts: 5,
            retry_backoff_seconds: 1.0,
            retryable_status_codes: [502, 503, 504].into(),
            request_timeout_seconds: 30.0,
            page_workers: 4,
            resource_workers: 8,
        }
    }
}

impl MirrorConfig {
    /// Read a TOML config file; keys that are absent keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| MirrorError::fs(path, e))?;
        toml::from_str(&raw)
            .map_err(|e| MirrorError::malformed(path.display().to_string(), e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_seconds)
            .unwrap_or_else(|_| Duration::from_secs(30))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_backoff_seconds)
            .unwrap_or_else(|_| Duration::from_secs(1))
    }
}
