//! External tool discovery.
//!
//! The whole pipeline is subprocess-driven; this module guarantees that
//! ffmpeg, ffprobe and yt-dlp exist before anything else runs, fetching
//! platform builds into a managed directory when they are missing and the
//! policy allows it.

mod gpu;
mod locator;
mod types;

pub use gpu::cuda_available;
pub use locator::ToolLocator;
pub use types::{ToolKind, ToolsConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    /// A required external binary cannot be located (and could not be fetched).
    #[error("missing dependency: {tool} not found ({hint})")]
    MissingDependency { tool: ToolKind, hint: String },

    #[error("failed to fetch {tool}: {reason}")]
    FetchFailed { tool: ToolKind, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
