//! yt-dlp subprocess driver.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cmd::{self, CancelFlag};

use super::config::DownloaderConfig;
use super::error::DownloadError;
use super::traits::MediaDownloader;
use super::types::{
    sanitize_filename, DownloadRequest, FormatKind, FormatProbe, PlaylistEntry, RemoteFormat,
    RemoteMedia,
};

/// Title length cap inside the output template; keeps paths well under the
/// Windows limit.
const TITLE_TEMPLATE: &str = "%(title).100s.%(ext)s";

/// Drives the yt-dlp binary.
pub struct YtDlpDownloader {
    binary: PathBuf,
    config: DownloaderConfig,
}

impl YtDlpDownloader {
    pub fn new(binary: PathBuf, config: DownloaderConfig) -> Self {
        Self { binary, config }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--ignore-errors".to_string(),
            "--no-colors".to_string(),
            "--fragment-retries".to_string(),
            "10".to_string(),
            "--retry-sleep".to_string(),
            "fragment:exp=1:300".to_string(),
        ];
        if let Some(cookies) = &self.config.cookies_file {
            if cookies.exists() {
                args.extend([
                    "--cookies".to_string(),
                    cookies.to_string_lossy().to_string(),
                ]);
            }
        }
        args
    }

    fn output_template(&self, request: &DownloadRequest, dest_dir: &Path) -> String {
        match &request.filename {
            Some(name) => dest_dir
                .join(sanitize_filename(name, 200))
                .to_string_lossy()
                .to_string(),
            None => dest_dir.join(TITLE_TEMPLATE).to_string_lossy().to_string(),
        }
    }

    /// Format selector, mirroring the fallback chain the service has always
    /// used for remote sites.
    fn format_selector(request: &DownloadRequest) -> String {
        match (&request.format_id, request.format_kind) {
            (Some(id), FormatKind::Video) => format!("{id}+bestaudio/best"),
            (Some(id), FormatKind::Audio) => id.clone(),
            (None, FormatKind::Video) => {
                "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best"
                    .to_string()
            }
            (None, FormatKind::Audio) => "bestaudio/best".to_string(),
        }
    }

    /// Ask yt-dlp what the final filename will be without downloading.
    async fn resolve_filename(
        &self,
        request: &DownloadRequest,
        template: &str,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, DownloadError> {
        let mut args = self.base_args();
        args.extend([
            "--get-filename".to_string(),
            "-o".to_string(),
            template.to_string(),
            request.url.clone(),
        ]);

        let out = cmd::run(&self.binary, &args, cancel, None)
            .await
            .map_err(map_cmd_error)?;

        let last_line = out
            .stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .next_back()
            .ok_or_else(|| DownloadError::Permanent {
                reason: "could not determine final download filename".to_string(),
            })?;

        Ok(PathBuf::from(last_line.trim()))
    }

    /// Skip-if-present: an existing file with the same stem counts as done.
    async fn find_existing(dest_dir: &Path, final_path: &Path) -> Option<PathBuf> {
        let stem = final_path.file_stem()?.to_string_lossy().to_string();
        let mut entries = tokio::fs::read_dir(dest_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().map(|e| e == "part").unwrap_or(false) {
                continue;
            }
            if path.file_stem().map(|s| s.to_string_lossy() == stem) == Some(true)
                && entry.metadata().await.map(|m| m.len() > 0).unwrap_or(false)
            {
                return Some(path);
            }
        }
        None
    }

    /// Run the actual download, streaming `[download]  42.3%` lines into
    /// the progress channel.
    async fn run_download(
        &self,
        args: &[String],
        progress: &mpsc::Sender<f32>,
        cancel: &CancelFlag,
    ) -> Result<(), DownloadError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.attempt_timeout_secs);
        debug!(?args, "yt-dlp download");

        let mut child = cmd::command(&self.binary, args)
            .spawn()
            .map_err(|e| DownloadError::Transient {
                reason: format!("failed to spawn yt-dlp: {e}"),
            })?;

        let stdout = child.stdout.take().expect("stdout is piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr is piped");
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr_pipe.read_to_string(&mut buf).await;
            buf
        });

        let mut reader = BufReader::new(stdout).lines();
        let pct_regex = Regex::new(r"\[download\]\s+(\d+\.?\d*)%").expect("static regex");

        loop {
            tokio::select! {
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(caps) = pct_regex.captures(&line) {
                            if let Ok(pct) = caps[1].parse::<f32>() {
                                let _ = progress.try_send(pct.clamp(0.0, 100.0));
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                },
                _ = cancel.cancelled() => {
                    cmd::terminate(&mut child, "yt-dlp").await;
                    return Err(DownloadError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    cmd::terminate(&mut child, "yt-dlp").await;
                    return Err(DownloadError::Transient {
                        reason: format!(
                            "download attempt timed out after {}s",
                            self.config.attempt_timeout_secs
                        ),
                    });
                }
            }
        }

        let status = child.wait().await.map_err(DownloadError::Io)?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(DownloadError::classify(cmd::stderr_tail(&stderr)));
        }
        Ok(())
    }
}

fn map_cmd_error(err: cmd::CmdError) -> DownloadError {
    match err {
        cmd::CmdError::Cancelled => DownloadError::Cancelled,
        cmd::CmdError::Io(e) => DownloadError::Io(e),
        cmd::CmdError::NonZeroExit { stderr_tail, .. } => DownloadError::classify(stderr_tail),
        cmd::CmdError::Timeout { timeout_secs, .. } => DownloadError::Transient {
            reason: format!("timed out after {timeout_secs}s"),
        },
        cmd::CmdError::Spawn { program, source } => DownloadError::Transient {
            reason: format!("failed to spawn {program}: {source}"),
        },
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str, check_playlist: bool) -> Result<FormatProbe, DownloadError> {
        let mut args = self.base_args();
        args.push("-J".to_string());
        if check_playlist {
            args.push("--flat-playlist".to_string());
        } else {
            args.push("--no-playlist".to_string());
        }
        args.push(url.to_string());

        let out = cmd::run(&self.binary, &args, &CancelFlag::new(), None)
            .await
            .map_err(map_cmd_error)?;

        parse_probe_json(&out.stdout)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        dest_dir: &Path,
        progress: mpsc::Sender<f32>,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(DownloadError::Io)?;

        let template = self.output_template(request, dest_dir);
        let final_path = self.resolve_filename(request, &template, cancel).await?;

        if let Some(existing) = Self::find_existing(dest_dir, &final_path).await {
            info!(path = %existing.display(), "already downloaded, skipping");
            let _ = progress.try_send(100.0);
            return Ok(existing);
        }

        let mut args = self.base_args();
        args.extend([
            "--newline".to_string(),
            "-o".to_string(),
            template,
            "-f".to_string(),
            Self::format_selector(request),
        ]);

        if request.wants_subtitles() {
            args.push("--write-subs".to_string());
            args.extend([
                "--sub-langs".to_string(),
                request.subtitles.clone().unwrap_or_default(),
            ]);
        }

        if request.format_kind == FormatKind::Audio {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                "192K".to_string(),
            ]);
        }

        args.push(request.url.clone());

        self.run_download(&args, &progress, cancel).await?;

        // Audio extraction rewrites the extension.
        let mut expected = final_path.clone();
        if request.format_kind == FormatKind::Audio {
            expected.set_extension("mp3");
        }

        for candidate in [&expected, &final_path] {
            if tokio::fs::metadata(candidate)
                .await
                .map(|m| m.len() > 0)
                .unwrap_or(false)
            {
                let _ = progress.try_send(100.0);
                return Ok(candidate.clone());
            }
        }

        // The tool sometimes lands on a slightly different name; take the
        // matching stem if one appeared.
        if let Some(found) = Self::find_existing(dest_dir, &final_path).await {
            let _ = progress.try_send(100.0);
            return Ok(found);
        }

        Err(DownloadError::Transient {
            reason: "download finished but no output file was found".to_string(),
        })
    }
}

#[derive(Deserialize)]
struct RawProbe {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    #[serde(default)]
    subtitles: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    entries: Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_id: String,
    ext: Option<String>,
    resolution: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
    filesize: Option<u64>,
}

#[derive(Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
}

#[derive(Deserialize)]
struct RawThumbnail {
    url: Option<String>,
}

fn parse_probe_json(stdout: &str) -> Result<FormatProbe, DownloadError> {
    let raw: RawProbe =
        serde_json::from_str(stdout.trim()).map_err(|e| DownloadError::Permanent {
            reason: format!("unparseable metadata: {e}"),
        })?;

    if raw.kind.as_deref() == Some("playlist") {
        let videos: Vec<PlaylistEntry> = raw
            .entries
            .into_iter()
            .filter_map(|e| {
                let url = e.url.or(e.webpage_url)?;
                Some(PlaylistEntry {
                    id: e.id.unwrap_or_default(),
                    title: e.title.unwrap_or_else(|| "untitled".to_string()),
                    url,
                    duration: e.duration,
                    thumbnail: e.thumbnails.into_iter().find_map(|t| t.url),
                })
            })
            .collect();
        let video_count = videos.len();
        return Ok(FormatProbe::Playlist {
            is_playlist: true,
            videos,
            video_count,
        });
    }

    let formats = raw
        .formats
        .into_iter()
        .map(|f| {
            let label = if f.vcodec.as_deref() == Some("none") {
                format!(
                    "Audio: {} ({})",
                    f.ext.as_deref().unwrap_or("?"),
                    f.format_note.as_deref().unwrap_or("")
                )
            } else {
                format!(
                    "{} - {} ({})",
                    f.ext.as_deref().unwrap_or("?"),
                    f.resolution.as_deref().unwrap_or("?"),
                    f.format_note.as_deref().unwrap_or("")
                )
            };
            RemoteFormat {
                format_id: f.format_id,
                ext: f.ext,
                resolution: f.resolution,
                vcodec: f.vcodec,
                acodec: f.acodec,
                note: f.format_note,
                filesize: f.filesize,
                label,
            }
        })
        .collect();

    Ok(FormatProbe::Single(RemoteMedia {
        id: raw.id.unwrap_or_default(),
        title: raw.title.unwrap_or_else(|| "untitled".to_string()),
        thumbnail: raw.thumbnail,
        subtitles: raw.subtitles.keys().cloned().collect(),
        formats,
    }))
}
