pub mod archiver;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod frontier;
pub mod logging;
pub mod mirror;
pub mod page_processor;
pub mod path_mapper;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use config::MirrorConfig;
pub use control::CancelToken;
pub use error::{MirrorError, Result};
pub use events::{ArchiveOutcome, RunSummary, StatusEvent};
pub use mirror::{Mirror, MirrorRequest};
