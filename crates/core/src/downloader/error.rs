use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Worth retrying (network hiccups, throttling, tool flakiness).
    #[error("download failed (transient): {reason}")]
    Transient { reason: String },

    /// Retrying cannot help (bad URL, format gone, private video).
    #[error("download failed: {reason}")]
    Permanent { reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Transient { .. })
    }

    /// Sort a failed tool run into transient vs permanent based on the
    /// messages yt-dlp actually prints.
    pub fn classify(stderr_tail: String) -> Self {
        const PERMANENT_MARKERS: [&str; 6] = [
            "Unsupported URL",
            "is not a valid URL",
            "Video unavailable",
            "Private video",
            "Requested format is not available",
            "This video is not available",
        ];

        if PERMANENT_MARKERS.iter().any(|m| stderr_tail.contains(m)) {
            DownloadError::Permanent {
                reason: stderr_tail,
            }
        } else {
            DownloadError::Transient {
                reason: stderr_tail,
            }
        }
    }
}
