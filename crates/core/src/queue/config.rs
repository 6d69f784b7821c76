use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Concurrent queue downloads (dispatcher width).
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// Concurrent folder-batch separations. Kept apart from the separation
    /// pool so a batch cannot monopolize it; the separators are RAM-heavy,
    /// keep this at 1 or 2.
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,

    /// Dispatcher poll interval while idle.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts per item before it goes Failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First retry backoff; doubles per attempt (2 s, 4 s, 8 s).
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
}

fn default_download_workers() -> usize {
    1
}

fn default_batch_workers() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            download_workers: default_download_workers(),
            batch_workers: default_batch_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
        }
    }
}
