//! nomusic core: the vocal-separation pipeline and its queues.
//!
//! Everything subprocess-shaped (ffmpeg, ffprobe, yt-dlp, the two AI
//! separators) sits behind traits; the pipeline orchestrates them into
//! polled, cancellable jobs.

pub mod align;
pub mod cmd;
pub mod config;
pub mod downloader;
pub mod jsonstore;
pub mod library;
pub mod media;
pub mod pipeline;
pub mod preset;
pub mod queue;
pub mod separator;
pub mod testing;
pub mod tools;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, SanitizedConfig,
};
pub use downloader::{
    DownloadRequest, FormatKind, FormatProbe, MediaDownloader, YtDlpDownloader,
};
pub use library::{LibraryRecord, LibraryStore};
pub use media::{MediaProbe, MediaToolkit, MediaTools};
pub use pipeline::{
    CancelOutcome, JobFilter, JobKind, JobSnapshot, ModelSelection, PipelineError,
    SeparationOptions, SeparationPipeline,
};
pub use preset::{Preset, PresetStore};
pub use queue::{BatchManager, BatchStatus, DownloadQueue, QueueAddRequest, QueueSnapshot};
pub use separator::{DemucsDriver, Separator, SpleeterDriver};
pub use tools::{ToolKind, ToolLocator};
