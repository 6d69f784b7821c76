use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Concurrent separation jobs. The separators are RAM-heavy (~8 GB
    /// each), so the default stays at one.
    #[serde(default = "default_separation_workers")]
    pub separation_workers: usize,

    /// Keep per-job temp directories after terminal transitions.
    #[serde(default)]
    pub keep_temp: bool,

    /// Audio-track language priority for multi-track containers,
    /// first match wins. Empty selects the first audio track.
    #[serde(default)]
    pub language_preference: Vec<String>,
}

fn default_separation_workers() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            separation_workers: default_separation_workers(),
            keep_temp: false,
            language_preference: Vec::new(),
        }
    }
}
