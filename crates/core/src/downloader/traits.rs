use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::cmd::CancelFlag;

use super::error::DownloadError;
use super::types::{DownloadRequest, FormatProbe};

/// A remote-media downloader backend.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Backend name for logging/errors.
    fn name(&self) -> &str;

    /// Inspect a URL: metadata + formats, or a playlist listing when
    /// `check_playlist` is set and the URL resolves to one.
    async fn probe(&self, url: &str, check_playlist: bool) -> Result<FormatProbe, DownloadError>;

    /// Download into `dest_dir`, reporting percentages on `progress`.
    /// Returns the final file path.
    async fn download(
        &self,
        request: &DownloadRequest,
        dest_dir: &Path,
        progress: mpsc::Sender<f32>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, DownloadError>;
}
