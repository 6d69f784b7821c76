use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::align::AlignConfig;
use crate::downloader::DownloaderConfig;
use crate::pipeline::PipelineConfig;
use crate::queue::QueueConfig;
use crate::separator::SeparatorConfig;
use crate::tools::ToolsConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub separator: SeparatorConfig,
    #[serde(default)]
    pub align: AlignConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub downloader: DownloaderConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    // Local-only service; the UI talks to it from the same machine.
    "127.0.0.1".parse().unwrap()
}

fn default_port() -> u16 {
    8000
}

/// On-disk layout: persistent JSON files and output directories.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory for final separated files (`nomusic-<stem>.<ext>`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory raw downloads land in.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Directory uploaded files are staged in.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Root for per-job temporary directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Persistent download queue state.
    #[serde(default = "default_queue_file")]
    pub queue_file: PathBuf,
    /// Completed-job library.
    #[serde(default = "default_library_file")]
    pub library_file: PathBuf,
    /// Output presets (`video.json`).
    #[serde(default = "default_preset_file")]
    pub preset_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            download_dir: default_download_dir(),
            upload_dir: default_upload_dir(),
            work_dir: default_work_dir(),
            queue_file: default_queue_file(),
            library_file: default_library_file(),
            preset_file: default_preset_file(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("nomusic")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("download")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("nomusic-work")
}

fn default_queue_file() -> PathBuf {
    PathBuf::from("download_queue.json")
}

fn default_library_file() -> PathBuf {
    PathBuf::from("library.json")
}

fn default_preset_file() -> PathBuf {
    PathBuf::from("video.json")
}

/// Config view safe to expose over the API.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub output_dir: PathBuf,
    pub download_dir: PathBuf,
    pub separation_workers: usize,
    pub download_workers: usize,
    pub batch_workers: usize,
    pub demucs_workers: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            output_dir: config.storage.output_dir.clone(),
            download_dir: config.storage.download_dir.clone(),
            separation_workers: config.pipeline.separation_workers,
            download_workers: config.queue.download_workers,
            batch_workers: config.queue.batch_workers,
            demucs_workers: config.separator.demucs_workers,
        }
    }
}
