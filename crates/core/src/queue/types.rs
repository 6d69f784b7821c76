use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::downloader::{DownloadRequest, FormatKind};
use crate::media::MediaProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

/// One entry of the persistent download queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_id: String,
    pub url: String,
    #[serde(default)]
    pub format_kind: FormatKind,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default)]
    pub auto_separate: bool,
    pub status: QueueItemStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub attempt_count: u32,
    /// Display title when known (batch adds from a playlist probe).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    pub fn to_download_request(&self) -> DownloadRequest {
        DownloadRequest {
            url: self.url.clone(),
            format_kind: self.format_kind,
            format_id: self.format_id.clone(),
            subtitles: self.subtitles.clone(),
            filename: None,
        }
    }
}

/// API shape for enqueueing a download.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueAddRequest {
    pub url: String,
    #[serde(default, alias = "format")]
    pub format_kind: FormatKind,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub subtitles: Option<String>,
    #[serde(default)]
    pub auto_separate: bool,
    #[serde(default)]
    pub title: Option<String>,
}

impl QueueAddRequest {
    pub fn into_item(self) -> QueueItem {
        QueueItem {
            queue_id: uuid::Uuid::new_v4().to_string(),
            url: self.url,
            format_kind: self.format_kind,
            format_id: self.format_id,
            subtitles: self.subtitles,
            auto_separate: self.auto_separate,
            status: QueueItemStatus::Pending,
            progress: 0,
            attempt_count: 0,
            title: self.title,
            error: None,
        }
    }
}

/// Wire view of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueItem>,
    pub processing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One file of a scanned folder batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub batch_id: String,
    pub file_id: String,
    pub path: PathBuf,
    pub file_name: String,
    pub selected: bool,
    pub status: BatchItemStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaProbe>,
}
