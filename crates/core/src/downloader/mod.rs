//! Remote-media download driver (yt-dlp).

mod config;
mod error;
mod traits;
mod types;
mod ytdlp;

pub use config::DownloaderConfig;
pub use error::DownloadError;
pub use traits::MediaDownloader;
pub use types::{
    sanitize_filename, DownloadRequest, FormatKind, FormatProbe, PlaylistEntry, RemoteFormat,
    RemoteMedia,
};
pub use ytdlp::YtDlpDownloader;
