use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloaderConfig {
    /// Wall-clock limit for a single download attempt.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Cookies file forwarded to the downloader (age-restricted content).
    #[serde(default)]
    pub cookies_file: Option<std::path::PathBuf>,
}

fn default_attempt_timeout() -> u64 {
    30 * 60
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout(),
            cookies_file: None,
        }
    }
}
