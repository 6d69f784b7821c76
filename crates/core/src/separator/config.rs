//! Configuration for the separator drivers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeparatorConfig {
    /// Python interpreter both models are launched through.
    #[serde(default = "default_python")]
    pub python: PathBuf,

    /// Inputs longer than this are split before separation.
    #[serde(default = "default_segment_len")]
    pub segment_len_secs: f64,

    /// Parallel segments per driver. Separators are RAM-heavy; keep small.
    #[serde(default = "default_demucs_workers")]
    pub demucs_workers: usize,

    /// Demucs model name (`-n`).
    #[serde(default = "default_demucs_model")]
    pub demucs_model: String,

    /// Spleeter pretrained config (`-p`).
    #[serde(default = "default_spleeter_model")]
    pub spleeter_model: String,
}

fn default_python() -> PathBuf {
    PathBuf::from("python3")
}

fn default_segment_len() -> f64 {
    600.0
}

fn default_demucs_workers() -> usize {
    2
}

fn default_demucs_model() -> String {
    "htdemucs".to_string()
}

fn default_spleeter_model() -> String {
    "spleeter:2stems".to_string()
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            python: default_python(),
            segment_len_secs: default_segment_len(),
            demucs_workers: default_demucs_workers(),
            demucs_model: default_demucs_model(),
            spleeter_model: default_spleeter_model(),
        }
    }
}
