//! Mock downloader backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::cmd::CancelFlag;
use crate::downloader::{
    DownloadError, DownloadRequest, FormatProbe, MediaDownloader, RemoteMedia,
};

/// Controllable [`MediaDownloader`]:
/// - fail the first N attempts with a transient error (retry testing)
/// - inject a permanent failure
/// - simulate transfer time (cancellable)
pub struct MockDownloader {
    delay: RwLock<Duration>,
    fail_first: AtomicU32,
    permanent_failure: RwLock<bool>,
    calls: AtomicU32,
    file_name: RwLock<String>,
    requested_urls: RwLock<Vec<String>>,
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloader {
    pub fn new() -> Self {
        Self {
            delay: RwLock::new(Duration::from_millis(10)),
            fail_first: AtomicU32::new(0),
            permanent_failure: RwLock::new(false),
            calls: AtomicU32::new(0),
            file_name: RwLock::new("mock-download.mp4".to_string()),
            requested_urls: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Fail the next `n` download calls with a transient error.
    pub fn fail_first(&self, n: u32) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    pub async fn set_permanent_failure(&self, fail: bool) {
        *self.permanent_failure.write().await = fail;
    }

    pub async fn set_file_name(&self, name: impl Into<String>) {
        *self.file_name.write().await = name.into();
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs passed to `download`, in call order.
    pub async fn requested_urls(&self) -> Vec<String> {
        self.requested_urls.read().await.clone()
    }
}

#[async_trait]
impl MediaDownloader for MockDownloader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, url: &str, _check_playlist: bool) -> Result<FormatProbe, DownloadError> {
        Ok(FormatProbe::Single(RemoteMedia {
            id: "mock".to_string(),
            title: format!("Mock of {url}"),
            thumbnail: None,
            subtitles: vec![],
            formats: vec![],
        }))
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        dest_dir: &Path,
        progress: mpsc::Sender<f32>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_urls.write().await.push(request.url.clone());

        if *self.permanent_failure.read().await {
            return Err(DownloadError::Permanent {
                reason: "mock permanent failure".to_string(),
            });
        }

        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DownloadError::Transient {
                reason: "mock transient failure".to_string(),
            });
        }

        let _ = progress.try_send(50.0);
        let delay = *self.delay.read().await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(self.file_name.read().await.clone());
        tokio::fs::write(&path, b"mock media payload").await?;
        let _ = progress.try_send(100.0);
        Ok(path)
    }
}
