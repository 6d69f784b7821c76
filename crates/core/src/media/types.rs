//! Probe result types and media-extension helpers.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// One audio stream of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Stream index inside the container (ffmpeg `-map 0:<index>`).
    pub index: u32,
    /// ISO language tag, `"unknown"` when untagged.
    pub language: String,
    /// Codec name as reported by ffprobe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

/// Snapshot of a media file's relevant metadata.
///
/// Computed once per input and cached on the job; the UI renders it as-is,
/// so field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    /// Duration in seconds.
    pub duration_s: f64,
    /// Whether the container has a video stream.
    pub is_video: bool,
    /// Video codec (if video).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Primary audio codec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// `WxH` of the first video stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// All audio streams, in container order.
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
}

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "mkv", "mov", "avi", "flv", "webm", "wmv"];
const AUDIO_EXTENSIONS: [&str; 7] = ["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"];

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

pub fn is_video_file(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_audio_file(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Anything the folder scanner and batch queue will accept.
pub fn is_media_file(path: &Path) -> bool {
    is_video_file(path) || is_audio_file(path)
}
