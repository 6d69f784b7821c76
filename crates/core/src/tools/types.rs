use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The external binaries the service depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Ffmpeg,
    Ffprobe,
    YtDlp,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Ffmpeg, ToolKind::Ffprobe, ToolKind::YtDlp];

    /// Executable name on this platform.
    pub fn binary_name(&self) -> &'static str {
        match self {
            ToolKind::Ffmpeg => {
                if cfg!(windows) {
                    "ffmpeg.exe"
                } else {
                    "ffmpeg"
                }
            }
            ToolKind::Ffprobe => {
                if cfg!(windows) {
                    "ffprobe.exe"
                } else {
                    "ffprobe"
                }
            }
            ToolKind::YtDlp => {
                if cfg!(windows) {
                    "yt-dlp.exe"
                } else {
                    "yt-dlp"
                }
            }
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolKind::Ffmpeg => write!(f, "ffmpeg"),
            ToolKind::Ffprobe => write!(f, "ffprobe"),
            ToolKind::YtDlp => write!(f, "yt-dlp"),
        }
    }
}

/// Tool discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Directory fetched tools are installed into.
    #[serde(default = "default_tools_dir")]
    pub dir: PathBuf,

    /// Whether missing tools may be downloaded at startup.
    #[serde(default = "default_allow_fetch")]
    pub allow_fetch: bool,

    /// Explicit binary overrides; skip discovery entirely when set.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Fetch URL overrides. A URL ending in `.zip` is treated as an archive
    /// containing the binary; anything else is saved as the binary itself.
    #[serde(default)]
    pub ffmpeg_url: Option<String>,
    #[serde(default)]
    pub ffprobe_url: Option<String>,
    #[serde(default)]
    pub ytdlp_url: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dir: default_tools_dir(),
            allow_fetch: default_allow_fetch(),
            ffmpeg_path: None,
            ffprobe_path: None,
            ytdlp_path: None,
            ffmpeg_url: None,
            ffprobe_url: None,
            ytdlp_url: None,
        }
    }
}

impl ToolsConfig {
    pub fn override_path(&self, kind: ToolKind) -> Option<&PathBuf> {
        match kind {
            ToolKind::Ffmpeg => self.ffmpeg_path.as_ref(),
            ToolKind::Ffprobe => self.ffprobe_path.as_ref(),
            ToolKind::YtDlp => self.ytdlp_path.as_ref(),
        }
    }

    pub fn fetch_url(&self, kind: ToolKind) -> Option<String> {
        let configured = match kind {
            ToolKind::Ffmpeg => self.ffmpeg_url.clone(),
            ToolKind::Ffprobe => self.ffprobe_url.clone(),
            ToolKind::YtDlp => self.ytdlp_url.clone(),
        };
        configured.or_else(|| default_fetch_url(kind).map(str::to_string))
    }
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("tools")
}

fn default_allow_fetch() -> bool {
    true
}

/// Built-in fetch locations. yt-dlp publishes single-file binaries; ffmpeg
/// and ffprobe have no universal single-binary source on every platform, so
/// those default to None outside Windows and must come from PATH or config.
fn default_fetch_url(kind: ToolKind) -> Option<&'static str> {
    match kind {
        ToolKind::YtDlp => {
            if cfg!(windows) {
                Some("https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe")
            } else if cfg!(target_os = "macos") {
                Some("https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos")
            } else {
                Some("https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp")
            }
        }
        ToolKind::Ffmpeg | ToolKind::Ffprobe => None,
    }
}
