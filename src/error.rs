use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the mirroring pipeline.
///
/// Per-job failures (a bad URL, an exhausted fetch, a file that would not
/// write) are converted into status events by the run loop and do not abort
/// the crawl. Only an unusable seed set or an output root that cannot be
/// created is terminal.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// URL could not be parsed or uses a scheme we cannot fetch.
    #[error("malformed url `{url}`: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// None of the supplied seeds parsed as absolute http(s) URLs.
    #[error("no usable seed urls")]
    NoValidSeeds,

    /// The HTTP client could not be constructed.
    #[error("http client setup: {0}")]
    Client(#[from] reqwest::Error),

    /// Retries exhausted or a non-retryable response.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Could not create a directory or write a file.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Packaging the output tree failed; the tree itself is still valid.
    #[error("archive failed at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

pub type Result<T> = std::result::Result<T, MirrorError>;

impl MirrorError {
    pub(crate) fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}
